//! 退款相关接口（统一收单交易退款接口）。
//! 参见 <https://opendocs.alipay.com/open/028sm9>

use crate::client::AlipayClient;
use crate::error::AlipayApiError;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// 网关调用成功的返回码。
const GATEWAY_CODE_SUCCESS: &str = "10000";

impl AlipayClient {
    /// 退款。同一笔交易多次（部分）退款时，须以 out_request_no 区分每次请求。
    /// 网关返回码不为 10000 时，以 `AlipayApiError` 报错。
    pub async fn refund(&self, params: &RefundParams) -> Result<RefundResponse> {
        let mut vals = self.base_params("alipay.trade.refund");
        match (&params.out_trade_no, &params.trade_no) {
            (Some(out_trade_no), _) => vals.add("out_trade_no", out_trade_no.clone()),
            (None, Some(trade_no)) => vals.add("trade_no", trade_no.clone()),
            (None, None) => {
                anyhow::bail!("either `out_trade_no` or `trade_no` is required")
            }
        }
        vals.add("refund_amount", params.refund_amount.clone());
        if let Some(refund_reason) = &params.refund_reason {
            vals.add("refund_reason", refund_reason.clone());
        }
        if let Some(out_request_no) = &params.out_request_no {
            vals.add("out_request_no", out_request_no.clone());
        }

        self.sign_params(&mut vals)?;
        let url = self.gateway_url(&vals)?;

        let res = self.client.get(url).send().await?;
        let envelope: RefundEnvelope = res.json().await?;
        let refund = envelope.alipay_trade_refund_response;

        if refund.code != GATEWAY_CODE_SUCCESS {
            let e = AlipayApiError {
                code: refund.code,
                msg: refund.msg,
                sub_code: refund.sub_code,
                sub_msg: refund.sub_msg,
            };
            return Err(e.into());
        }
        Ok(refund)
    }
}

/// 退款请求参数。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundParams {
    /// 商户订单号。与 trade_no 二选一。
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub out_trade_no: Option<String>,
    /// 支付宝交易号。与 out_trade_no 二选一，两者同时存在时优先取 out_trade_no。
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trade_no: Option<String>,
    /// 退款金额。单位为元，不能大于订单总金额。
    pub refund_amount: String,
    /// 退款原因说明
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub refund_reason: Option<String>,
    /// 退款请求号。标识一次退款请求，部分退款时必传，且需保证在交易内唯一。
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub out_request_no: Option<String>,
}

/// 网关响应的外层信封。业务字段嵌在 alipay_trade_refund_response 里。
#[derive(Debug, Clone, Deserialize)]
struct RefundEnvelope {
    alipay_trade_refund_response: RefundResponse,
    /// 网关对响应的签名，暂未验证
    #[serde(default)]
    #[allow(unused)]
    sign: String,
}

/// 退款响应。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefundResponse {
    /// 网关返回码
    pub code: String,
    /// 网关返回码描述
    pub msg: String,
    /// 业务返回码
    pub sub_code: String,
    /// 业务返回码描述
    pub sub_msg: String,
    /// 支付宝交易号
    pub trade_no: String,
    /// 商户订单号
    pub out_trade_no: String,
    /// 用户的登录 id
    pub buyer_logon_id: String,
    /// 本次退款是否发生了资金变化。Y/N
    pub fund_change: String,
    /// 退款总金额
    pub refund_fee: String,
    /// 退款使用的资金渠道
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_detail_item_list: Option<Vec<RefundDetailItem>>,
    /// 交易在支付时候的门店名称
    pub store_name: String,
    /// 买家在支付宝的用户 id
    pub buyer_user_id: String,
    /// 本次商户实际退回金额
    pub send_back_fee: String,
}

/// 退款使用的资金渠道明细。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefundDetailItem {
    /// 交易使用的资金渠道
    pub fund_channel: String,
    /// 该支付工具类型所使用的金额
    pub amount: String,
    /// 渠道实际付款金额
    pub real_amount: String,
    /// 渠道所使用的资金类型
    pub fund_type: String,
}
