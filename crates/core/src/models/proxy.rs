use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{CrawlerError, CrawlerResult};

/// 代理协议
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks5 => "socks5",
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProxyScheme {
    type Err = CrawlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyScheme::Http),
            "https" => Ok(ProxyScheme::Https),
            "socks5" => Ok(ProxyScheme::Socks5),
            other => Err(CrawlerError::Proxy(format!("不支持的代理协议: {other}"))),
        }
    }
}

/// 代理记录
///
/// `address` 形如 `host:port`。`valid` 与 `last_validated_at` 只由代理管理器更新。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyRecord {
    pub address: String,
    #[serde(default)]
    pub scheme: ProxyScheme,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl ProxyRecord {
    pub fn new(address: impl Into<String>, scheme: ProxyScheme) -> Self {
        Self {
            address: address.into(),
            scheme,
            valid: false,
            last_validated_at: None,
        }
    }

    /// 解析 `host:port` 或 `scheme://host:port`
    pub fn parse(input: &str) -> CrawlerResult<Self> {
        let input = input.trim();
        let (scheme, address) = match input.split_once("://") {
            Some((scheme, rest)) => (scheme.parse()?, rest),
            None => (ProxyScheme::Http, input),
        };
        let address = address.trim_end_matches('/');

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| CrawlerError::Proxy(format!("代理地址缺少端口: {input}")))?;
        if host.is_empty() {
            return Err(CrawlerError::Proxy(format!("代理地址缺少主机: {input}")));
        }
        port.parse::<u16>()
            .map_err(|_| CrawlerError::Proxy(format!("代理端口无效: {input}")))?;

        Ok(Self::new(address, scheme))
    }

    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme, self.address)
    }

    /// 校验结果是否已超过有效期
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match self.last_validated_at {
            Some(at) => now - at > ttl,
            None => true,
        }
    }

    pub fn same_endpoint(&self, other: &ProxyRecord) -> bool {
        self.address == other.address && self.scheme == other.scheme
    }
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proxy_addresses() {
        let proxy = ProxyRecord::parse("127.0.0.1:8080").unwrap();
        assert_eq!(proxy.scheme, ProxyScheme::Http);
        assert_eq!(proxy.url(), "http://127.0.0.1:8080");
        assert!(!proxy.valid);

        let proxy = ProxyRecord::parse("socks5://10.0.0.2:1080").unwrap();
        assert_eq!(proxy.scheme, ProxyScheme::Socks5);
        assert_eq!(proxy.address, "10.0.0.2:1080");

        assert!(ProxyRecord::parse("no-port").is_err());
        assert!(ProxyRecord::parse("host:notaport").is_err());
        assert!(ProxyRecord::parse("ftp://host:21").is_err());
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let mut proxy = ProxyRecord::parse("1.2.3.4:80").unwrap();
        assert!(proxy.is_stale(Duration::seconds(60), now));

        proxy.last_validated_at = Some(now - Duration::seconds(30));
        assert!(!proxy.is_stale(Duration::seconds(60), now));
        assert!(proxy.is_stale(Duration::seconds(10), now));
    }
}
