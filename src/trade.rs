//! 电脑网站支付（统一收单下单并支付页面接口）。
//! 参见 <https://opendocs.alipay.com/open/270/105898>

use crate::client::AlipayClient;
use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

/// 电脑支付场景下目前仅支持的销售产品码。
pub const PRODUCT_CODE_PAGE_PAY: &str = "FAST_INSTANT_TRADE_PAY";

impl AlipayClient {
    /// 电脑网站支付下单，返回带签名的收银台跳转 URL。
    /// 该接口不发起 HTTP 请求，用户浏览器跳转到返回的 URL 完成支付，
    /// 支付结果经异步通知送达（见 `verify_notification`）。
    pub fn page_pay_url(&self, params: &PagePayParams) -> Result<Url> {
        let mut vals = self.base_params("alipay.trade.page.pay");
        vals.add("notify_url", params.notify_url.clone());
        if let Some(return_url) = &params.return_url {
            vals.add("return_url", return_url.clone());
        }
        vals.add("out_trade_no", params.out_trade_no.clone());
        vals.add("total_amount", params.total_amount.clone());
        vals.add("subject", params.subject.clone());
        vals.add("product_code", PRODUCT_CODE_PAGE_PAY);
        if let Some(qr_pay_mode) = &params.qr_pay_mode {
            vals.add("qr_pay_mode", qr_pay_mode.clone());
        }
        if let Some(qrcode_width) = params.qrcode_width {
            vals.add("qrcode_width", qrcode_width.to_string());
        }

        self.sign_params(&mut vals)?;
        self.gateway_url(&vals)
    }
}

/// 电脑网站支付下单参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePayParams {
    /// 商户订单号。64 个字符以内，仅支持字母、数字、下划线，需保证在商户端不重复。
    pub out_trade_no: String,
    /// 订单总金额。单位为元，精确到小数点后两位，取值范围 [0.01, 100000000]。
    pub total_amount: String,
    /// 订单标题
    pub subject: String,
    /// 支付宝服务器主动通知商户服务器里指定的页面 http/https 路径
    pub notify_url: String,
    /// 支付成功后跳转页面 url
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub return_url: Option<String>,
    /// PC 扫码支付的方式，支持前置模式和跳转模式
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub qr_pay_mode: Option<String>,
    /// 商户自定义二维码宽度。qr_pay_mode=4 时该参数生效
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub qrcode_width: Option<u32>,
}

impl PagePayParams {
    pub fn new(
        out_trade_no: impl Into<String>,
        total_amount: impl Into<String>,
        subject: impl Into<String>,
        notify_url: impl Into<String>,
    ) -> PagePayParams {
        PagePayParams {
            out_trade_no: out_trade_no.into(),
            total_amount: total_amount.into(),
            subject: subject.into(),
            notify_url: notify_url.into(),
            return_url: None,
            qr_pay_mode: None,
            qrcode_width: None,
        }
    }
}

/// 交易状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    /// 交易创建，等待买家付款
    WaitBuyerPay,
    /// 未付款交易超时关闭，或支付完成后全额退款
    TradeClosed,
    /// 交易支付成功
    TradeSuccess,
    /// 交易结束，不可退款
    TradeFinished,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::WaitBuyerPay => "WAIT_BUYER_PAY",
            TradeStatus::TradeClosed => "TRADE_CLOSED",
            TradeStatus::TradeSuccess => "TRADE_SUCCESS",
            TradeStatus::TradeFinished => "TRADE_FINISHED",
        }
    }

    /// 买家是否已付款成功。TRADE_SUCCESS 与 TRADE_FINISHED 均算。
    pub fn is_paid(&self) -> bool {
        matches!(self, TradeStatus::TradeSuccess | TradeStatus::TradeFinished)
    }
}

impl<'de> Deserialize<'de> for TradeStatus {
    fn deserialize<D>(deserializer: D) -> Result<TradeStatus, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?.to_ascii_uppercase();
        match s.as_str() {
            "WAIT_BUYER_PAY" => Ok(TradeStatus::WaitBuyerPay),
            "TRADE_CLOSED" => Ok(TradeStatus::TradeClosed),
            "TRADE_SUCCESS" => Ok(TradeStatus::TradeSuccess),
            "TRADE_FINISHED" => Ok(TradeStatus::TradeFinished),
            _ => Err(serde::de::Error::custom(format!(
                "unknown trade status: {}",
                s
            ))),
        }
    }
}

impl Serialize for TradeStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// 生成商户订单号，长度为 27 字符。形如:
/// mca8fa-nua7q2-adaf8a-ada8fa
/// 每 6 个字符一组，以 `-` 连接。
pub fn generate_out_trade_no() -> String {
    const ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyzABCDEFGHJKLMNPQRSTRVWXYZ23456789";
    let mut rng = rand::thread_rng();

    let mut s = String::new();
    for i in 1..=24 {
        let idx = rng.gen_range(0..ALPHABET.len());
        s.push(ALPHABET[idx] as char);
        if i % 6 == 0 && i != 24 {
            s.push('-');
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::{verify_sign, ParameterSet};
    use crate::util::testutil::{rsa_public_key_pem, test_client};

    #[test]
    fn test_page_pay_url_is_signed_and_verifiable() -> anyhow::Result<()> {
        let client = test_client();
        let mut params = PagePayParams::new(
            "1001",
            "10.00",
            "test",
            "https://example.com/alipay/notify",
        );
        params.return_url = Some("https://example.com/return".to_string());

        let url = client.page_pay_url(&params)?;
        assert!(url.as_str().starts_with(crate::client::GATEWAY));

        // 把 URL 上的参数还原回参数集，签名应当能通过验签
        let form: ParameterSet = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let sign = form.first("sign").unwrap_or_default().to_string();
        let sign_type = form.first("sign_type").unwrap_or_default().to_string();

        assert_eq!(sign_type, "RSA2");
        assert_eq!(form.first("method"), Some("alipay.trade.page.pay"));
        assert_eq!(form.first("product_code"), Some(PRODUCT_CODE_PAGE_PAY));
        assert!(verify_sign(&form, &sign, &sign_type, &rsa_public_key_pem()));
        Ok(())
    }

    #[test]
    fn test_trade_status_serde() -> anyhow::Result<()> {
        #[derive(Debug, Serialize, Deserialize)]
        struct Wrapper {
            ts: TradeStatus,
        }

        let w = Wrapper {
            ts: TradeStatus::TradeSuccess,
        };
        let s = serde_json::to_string(&w)?;
        assert_eq!(s, r#"{"ts":"TRADE_SUCCESS"}"#);

        let w2: Wrapper = serde_json::from_str(r#"{"ts":"WAIT_BUYER_PAY"}"#)?;
        assert_eq!(w2.ts, TradeStatus::WaitBuyerPay);
        assert!(serde_json::from_str::<Wrapper>(r#"{"ts":"TRADE_UNKNOWN"}"#).is_err());
        Ok(())
    }

    #[test]
    fn test_trade_status_is_paid() {
        assert!(TradeStatus::TradeSuccess.is_paid());
        assert!(TradeStatus::TradeFinished.is_paid());
        assert!(!TradeStatus::WaitBuyerPay.is_paid());
        assert!(!TradeStatus::TradeClosed.is_paid());
    }

    #[test]
    fn test_generate_out_trade_no() {
        let s = generate_out_trade_no();
        assert_eq!(s.len(), 27);
        assert_eq!(s.chars().nth(6), Some('-'));
        assert_eq!(s.chars().nth(13), Some('-'));
        assert_eq!(s.chars().nth(20), Some('-'));
    }
}
