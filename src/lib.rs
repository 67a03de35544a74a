pub mod client;
pub mod error;
pub mod notify;
pub mod refund;
pub mod sign;
pub mod sms;
pub mod trade;
pub mod util;

pub use client::{AlipayClient, AlipayClientBuilder};
pub use error::{AlipayApiError, SignError};
pub use notify::TradeNotification;
pub use sign::ParameterSet;
