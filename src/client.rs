use crate::error::SignError;
use crate::sign::{
    self, format_private_key, format_public_key, parse_private_key, parse_public_key,
    ParameterSet, FIELD_SIGN, FIELD_SIGN_TYPE, SIGN_TYPE_RSA2,
};
use crate::util::DATETIME_FORMAT;
use anyhow::Result;
use chrono::Local;
use reqwest::Client;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

/// 支付宝网关地址。
pub const GATEWAY: &str = "https://openapi.alipay.com/gateway.do";

/// 以"支付宝公钥"方式（非证书方式）配置时，在密钥仓库中使用的固定序列号。
const ALIPAY_PUBLIC_KEY_SERIAL_NO: &str = "alipay-public-key";

#[derive(Clone)]
pub struct AlipayClient {
    pub(crate) client: Client,
    /// 支付宝分配给开发者的应用 ID
    pub(crate) app_id: String,
    /// 开发者应用私钥
    pub(crate) app_private_key: RsaPrivateKey,
    /// 按序列号存放的支付宝公钥。
    /// 通知处理与公钥（重新）加载可能并发发生，读写都要持锁。
    pub(crate) public_key_store: Arc<Mutex<PublicKeyStore>>,
    pub(crate) gateway: String,
}

/// 支付宝公钥仓库，序列号 -> 已解析的公钥。
#[derive(Debug, Default)]
pub struct PublicKeyStore {
    current_serial_no: Option<String>,
    keys: HashMap<String, RsaPublicKey>,
}

impl PublicKeyStore {
    /// 存入一把公钥，并把它记为当前使用的公钥。
    pub fn insert(&mut self, serial_no: impl Into<String>, key: RsaPublicKey) {
        let serial_no = serial_no.into();
        self.keys.insert(serial_no.clone(), key);
        self.current_serial_no = Some(serial_no);
    }

    /// 按序列号取公钥。
    pub fn get(&self, serial_no: &str) -> Option<&RsaPublicKey> {
        self.keys.get(serial_no)
    }

    /// 当前使用的公钥。
    pub fn current(&self) -> Option<&RsaPublicKey> {
        self.current_serial_no
            .as_deref()
            .and_then(|sn| self.keys.get(sn))
    }
}

impl AlipayClient {
    pub fn builder() -> AlipayClientBuilder {
        AlipayClientBuilder::new()
    }

    /// 以 app_id、应用私钥、支付宝公钥构造客户端。
    pub fn new(app_id: &str, app_private_key: &str, alipay_public_key: &str) -> Result<AlipayClient> {
        let mut builder = AlipayClient::builder();
        builder
            .app_id(app_id.to_string())
            .app_private_key(app_private_key.to_string())
            .alipay_public_key(alipay_public_key.to_string());
        builder.build()
    }

    /// 加载（或重新加载）支付宝公钥。
    /// 原始文本先整形为标准 PEM 再解析，解析成功后才会替换仓库中的公钥。
    pub fn load_alipay_public_key(&self, raw: &str) -> Result<()> {
        let pem = format_public_key(raw);
        if pem.is_empty() {
            anyhow::bail!("alipay public key not configured");
        }
        let key = parse_public_key(&pem)?;
        let mut store = self.public_key_store.lock().unwrap();
        store.insert(ALIPAY_PUBLIC_KEY_SERIAL_NO, key);
        Ok(())
    }

    /// 当前使用的支付宝公钥。
    pub(crate) fn alipay_public_key(&self) -> Result<RsaPublicKey> {
        let store = self.public_key_store.lock().unwrap();
        store
            .current()
            .cloned()
            .ok_or_else(|| anyhow::format_err!("alipay public key not loaded"))
    }

    /// 各接口共用的公共请求参数。
    pub(crate) fn base_params(&self, method: &str) -> ParameterSet {
        let mut params = ParameterSet::new();
        params.add("method", method);
        params.add("app_id", self.app_id.clone());
        params.add("timestamp", Local::now().format(DATETIME_FORMAT).to_string());
        params.add("charset", "utf-8");
        params.add("version", "1.0");
        params
    }

    /// 对参数集签名，并把 sign_type/sign 两个字段附加进去。
    /// 签名在 URL 编码之前、对规范化串进行。
    pub(crate) fn sign_params(&self, params: &mut ParameterSet) -> Result<(), SignError> {
        let canonical = params.canonicalize()?;
        let signature = sign::sign(canonical.as_bytes(), &self.app_private_key)?;
        params.add(FIELD_SIGN_TYPE, SIGN_TYPE_RSA2);
        params.add(FIELD_SIGN, signature);
        Ok(())
    }

    /// 把已签名的参数集编码为最终的网关请求 URL。
    pub(crate) fn gateway_url(&self, params: &ParameterSet) -> Result<Url> {
        let mut url = Url::parse(&self.gateway)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params.iter() {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

impl std::fmt::Debug for AlipayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlipayClient")
            .field("app_id", &self.app_id)
            .field("app_private_key", &"...")
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// builder for `AlipayClient`.
#[derive(Debug, Default)]
pub struct AlipayClientBuilder {
    app_id: Option<String>,
    app_private_key: Option<String>,
    alipay_public_key: Option<String>,
    gateway: Option<String>,
}

impl AlipayClientBuilder {
    fn new() -> AlipayClientBuilder {
        AlipayClientBuilder {
            ..Default::default()
        }
    }

    pub fn app_id(&mut self, app_id: String) -> &mut Self {
        self.app_id = Some(app_id);
        self
    }

    /// 应用私钥原始文本。PKCS#1 或 PKCS#8 头尾、折行混乱均可，build 时整形。
    pub fn app_private_key(&mut self, app_private_key: String) -> &mut Self {
        self.app_private_key = Some(app_private_key);
        self
    }

    /// 支付宝公钥原始文本。可不设置，之后通过 `load_alipay_public_key` 加载，
    /// 但未加载公钥时无法处理异步通知。
    pub fn alipay_public_key(&mut self, alipay_public_key: String) -> &mut Self {
        self.alipay_public_key = Some(alipay_public_key);
        self
    }

    /// 指定网关地址。沙箱环境时使用。未指定时使用生产网关。
    pub fn gateway(&mut self, gateway: String) -> &mut Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn build(&mut self) -> Result<AlipayClient> {
        let app_id = self
            .app_id
            .take()
            .ok_or_else(|| anyhow::format_err!("missing `app_id`"))?;
        let app_private_key = self
            .app_private_key
            .take()
            .ok_or_else(|| anyhow::format_err!("missing `app_private_key`"))?;

        let pem = format_private_key(&app_private_key);
        if pem.is_empty() {
            anyhow::bail!("app private key not configured");
        }
        let app_private_key = parse_private_key(&pem)?;

        let gateway = self.gateway.take().unwrap_or_else(|| GATEWAY.to_string());

        let client = AlipayClient {
            client: Client::new(),
            app_id,
            app_private_key,
            public_key_store: Arc::new(Mutex::new(PublicKeyStore::default())),
            gateway,
        };

        if let Some(raw) = self.alipay_public_key.take() {
            client.load_alipay_public_key(&raw)?;
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testutil::{rsa_private_key_pem, rsa_public_key_pem, test_client};

    #[test]
    fn test_builder_requires_private_key() {
        let err = AlipayClient::builder()
            .app_id("2021000100000001".to_string())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("app_private_key"));
    }

    #[test]
    fn test_build_without_public_key_then_load() -> anyhow::Result<()> {
        let mut builder = AlipayClient::builder();
        let client = builder
            .app_id("2021000100000001".to_string())
            .app_private_key(rsa_private_key_pem())
            .build()?;

        assert!(client.alipay_public_key().is_err());
        client.load_alipay_public_key(&rsa_public_key_pem())?;
        assert!(client.alipay_public_key().is_ok());
        Ok(())
    }

    #[test]
    fn test_load_alipay_public_key_rejects_empty() {
        let client = test_client();
        assert!(client.load_alipay_public_key("").is_err());
        assert!(client.load_alipay_public_key(" \n\t ").is_err());
        // 加载失败不影响已有公钥
        assert!(client.alipay_public_key().is_ok());
    }

    #[test]
    fn test_sign_params_appends_signature_fields() -> anyhow::Result<()> {
        let client = test_client();
        let mut params = client.base_params("alipay.trade.page.pay");
        params.add("out_trade_no", "1001");
        client.sign_params(&mut params)?;

        assert_eq!(params.first(FIELD_SIGN_TYPE), Some(SIGN_TYPE_RSA2));
        assert!(params.first(FIELD_SIGN).is_some());
        Ok(())
    }
}
