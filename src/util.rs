use rand::Rng;

/// 支付宝接口的日期时间格式，形如 `2018-06-08 10:34:56`，东八区时间。
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 根据 DATETIME_FORMAT 格式序列化/反序列化日期时间。
pub mod datetime_fmt {
    use super::DATETIME_FORMAT;
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::{Deserialize, Deserializer, Serializer};

    /// 根据 DATETIME_FORMAT 格式解析日期时间字符串。形如 `2018-06-08 10:34:56`。
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let naive = NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT)
            .map_err(serde::de::Error::custom)?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid local datetime: {}", s)))
    }

    /// 根据 DATETIME_FORMAT 格式格式化日期时间字符串。形如 `2018-06-08 10:34:56`。
    pub fn serialize<S>(dt: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = format!("{}", dt.format(DATETIME_FORMAT));
        serializer.serialize_str(&s)
    }
}

/// 根据 DATETIME_FORMAT 格式序列化/反序列化日期时间，只是针对 Option 类型。
pub mod option_datetime_fmt {
    use super::datetime_fmt::deserialize as deserialize_datetime;
    use super::datetime_fmt::serialize as serialize_datetime;
    use chrono::{DateTime, Local};
    use serde::{Deserialize, Deserializer, Serializer};

    /// 此实现来自 <https://github.com/serde-rs/serde/issues/1444#issuecomment-447546415>
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Local>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(deserialize_with = "deserialize_datetime")] DateTime<Local>);

        let v = Option::deserialize(deserializer)?;
        Ok(v.map(|Wrapper(a)| a))
    }

    pub fn serialize<S>(dt: &Option<DateTime<Local>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match dt {
            Some(dt) => serialize_datetime(dt, serializer),
            None => serializer.serialize_none(),
        }
    }
}

/// 生成长度为 n 的随机串，用于防重放的 nonce 等。
/// 字母表去掉了容易混淆的字符，比如 0, o, O, 1, l, i, I。
pub fn generate_nonce_str(n: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyzABCDEFGHJKLMNPQRSTRVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| {
            let idx = rng.gen_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect::<String>()
}
