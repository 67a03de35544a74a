//! 支付宝异步通知（服务器通知）的验签与解析。
//! 通知以表单编码 POST 到商户的 notify_url，
//! 参见 <https://opendocs.alipay.com/open/270/105902>

use crate::client::AlipayClient;
use crate::sign::{verify_sign_with_key, ParameterSet, FIELD_SIGN, FIELD_SIGN_TYPE};
use crate::trade::TradeStatus;
use crate::util::option_datetime_fmt;
use anyhow::Result;
use bytes::Bytes;
use chrono::{DateTime, Local};
use hyper::Body;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 验签通过、业务处理成功时应答给支付宝的内容。
/// 应答其他内容时，支付宝会按固定频率重发通知。
pub const NOTIFY_ACK_SUCCESS: &str = "success";
/// 验签失败或业务处理失败时应答给支付宝的内容。
pub const NOTIFY_ACK_FAILURE: &str = "failure";

impl AlipayClient {
    /// 对支付宝异步通知进行验签，验签通过后返回解析出的通知内容。
    /// 为避免对具体 web 框架的依赖，这里的参数为 `http::Request<hyper::Body>`。
    /// 验签不通过时返回错误，调用方必须应答 `NOTIFY_ACK_FAILURE`，
    /// 并且不得更新任何订单/支付状态。
    pub async fn verify_notification(
        &self,
        req: http::Request<Body>,
    ) -> Result<TradeNotification> {
        let body: Bytes = hyper::body::to_bytes(req.into_body()).await?;
        self.verify_notification_form(&body)
    }

    /// 同上，输入为已读出的表单编码请求体。
    pub fn verify_notification_form(&self, form: &[u8]) -> Result<TradeNotification> {
        let params: ParameterSet = url::form_urlencoded::parse(form)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let signature = params.first(FIELD_SIGN).unwrap_or_default().to_string();
        let sign_type = params.first(FIELD_SIGN_TYPE).unwrap_or_default().to_string();
        let public_key = self.alipay_public_key()?;

        if !verify_sign_with_key(&params, &signature, &sign_type, &public_key) {
            warn!("alipay notification signature verification failed");
            anyhow::bail!("notification signature verification failed");
        }
        TradeNotification::from_params(&params)
    }
}

/// 交易异步通知的内容。验签通过后才会产出。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeNotification {
    /// 商户订单号
    pub out_trade_no: String,
    /// 支付宝交易号
    pub trade_no: String,
    /// 交易状态
    pub trade_status: TradeStatus,
    /// 通知校验 ID
    #[serde(default)]
    pub notify_id: String,
    /// 通知类型，如 trade_status_sync
    #[serde(default)]
    pub notify_type: String,
    /// 支付宝分配给开发者的应用 ID
    #[serde(default)]
    pub app_id: String,
    /// 订单金额
    #[serde(default)]
    pub total_amount: String,
    /// 实收金额
    #[serde(default)]
    pub receipt_amount: String,
    /// 订单标题
    #[serde(default)]
    pub subject: String,
    /// 买家支付宝用户号
    #[serde(default)]
    pub buyer_id: String,
    /// 卖家支付宝用户号
    #[serde(default)]
    pub seller_id: String,
    /// 交易创建时间
    #[serde(default, with = "option_datetime_fmt")]
    pub gmt_create: Option<DateTime<Local>>,
    /// 交易付款时间
    #[serde(default, with = "option_datetime_fmt")]
    pub gmt_payment: Option<DateTime<Local>>,
    /// 通知发送时间
    #[serde(default, with = "option_datetime_fmt")]
    pub notify_time: Option<DateTime<Local>>,
}

impl TradeNotification {
    /// 从已验签的参数集解析通知内容。
    /// 同名参数取第一个值；表单通知中参数本不应重复出现。
    fn from_params(params: &ParameterSet) -> Result<TradeNotification> {
        let mut map = Map::new();
        for (key, value) in params.iter() {
            map.entry(key.to_string())
                .or_insert_with(|| Value::String(value.to_string()));
        }
        let notification = serde_json::from_value(Value::Object(map))?;
        Ok(notification)
    }
}
