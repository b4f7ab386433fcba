// LDAP URL parsing and rendering (RFC 4516).
//
//   scheme://[host[:port]]/[dn[?attributes[?scope[?filter[?extensions]]]]]
//
// Used to check the URIs carried in SearchResultReference and LDAPResult
// referrals, and usable on its own by callers chasing referrals.

use crate::dn::{self, DnError};
use crate::filter::{Filter, FilterParseError};
use crate::message::SearchScope;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("unsupported URL scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("invalid port {0:?}")]
    InvalidPort(String),

    #[error("malformed percent-encoding in {0:?}")]
    BadPercentEncoding(String),

    #[error("too many '?' separated components")]
    TooManyComponents,

    #[error("invalid scope {0:?}")]
    InvalidScope(String),

    #[error("invalid DN: {0}")]
    InvalidDn(#[from] DnError),

    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterParseError),

    #[error("empty extension")]
    EmptyExtension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ldap,
    Ldaps,
    Ldapi,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Ldap => "ldap",
            Scheme::Ldaps => "ldaps",
            Scheme::Ldapi => "ldapi",
        }
    }

    /// Well-known port, none for the socket-path scheme.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Scheme::Ldap => Some(389),
            Scheme::Ldaps => Some(636),
            Scheme::Ldapi => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlExtension {
    pub critical: bool,
    pub oid: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapUrl {
    pub scheme: Scheme,
    /// Empty when the URL leaves the server to the client's choice.
    pub host: String,
    pub port: Option<u16>,
    pub dn: String,
    pub attributes: Vec<String>,
    pub scope: SearchScope,
    /// None means the default `(objectClass=*)`.
    pub filter: Option<Filter>,
    pub extensions: Vec<UrlExtension>,
}

impl LdapUrl {
    pub fn parse(input: &str) -> Result<LdapUrl, UrlError> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| UrlError::UnsupportedScheme(input.to_string()))?;
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "ldap" => Scheme::Ldap,
            "ldaps" => Scheme::Ldaps,
            "ldapi" => Scheme::Ldapi,
            _ => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
        };

        let (hostport, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        };
        let (host, port) = split_host_port(hostport)?;

        let parts: Vec<&str> = path.split('?').collect();
        if parts.len() > 5 {
            return Err(UrlError::TooManyComponents);
        }
        let part = |i: usize| parts.get(i).copied().unwrap_or("");

        let dn = percent_decode(part(0))?;
        dn::parse(&dn)?;

        let attributes = split_list(part(1))
            .map(percent_decode)
            .collect::<Result<Vec<_>, _>>()?;

        let scope = match part(2).to_ascii_lowercase().as_str() {
            "" | "base" => SearchScope::BaseObject,
            "one" => SearchScope::SingleLevel,
            "sub" => SearchScope::WholeSubtree,
            other => return Err(UrlError::InvalidScope(other.to_string())),
        };

        let filter = match part(3) {
            "" => None,
            raw => Some(Filter::parse(&percent_decode(raw)?)?),
        };

        let extensions = split_list(part(4))
            .map(parse_extension)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LdapUrl {
            scheme,
            host,
            port,
            dn,
            attributes,
            scope,
            filter,
            extensions,
        })
    }

    /// The search filter, defaulting to `(objectClass=*)`.
    pub fn filter_or_default(&self) -> Filter {
        self.filter
            .clone()
            .unwrap_or_else(|| Filter::present("objectClass"))
    }
}

fn split_host_port(hostport: &str) -> Result<(String, Option<u16>), UrlError> {
    // IPv6 literal: [addr]:port
    let (host, port) = if let Some(stripped) = hostport.strip_prefix('[') {
        match stripped.split_once(']') {
            Some((addr, tail)) => (format!("[{}]", addr), tail.strip_prefix(':')),
            None => return Err(UrlError::InvalidPort(hostport.to_string())),
        }
    } else {
        match hostport.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), Some(port)),
            None => (hostport.to_string(), None),
        }
    };
    let port = match port {
        None | Some("") => None,
        Some(p) => Some(p.parse::<u16>().map_err(|_| UrlError::InvalidPort(p.to_string()))?),
    };
    Ok((percent_decode(&host)?, port))
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').filter(|s| !s.is_empty())
}

fn parse_extension(raw: &str) -> Result<UrlExtension, UrlError> {
    let (critical, body) = match raw.strip_prefix('!') {
        Some(body) => (true, body),
        None => (false, raw),
    };
    let (oid, value) = match body.split_once('=') {
        Some((oid, value)) => (oid, Some(percent_decode(value)?)),
        None => (body, None),
    };
    let oid = percent_decode(oid)?;
    if oid.is_empty() {
        return Err(UrlError::EmptyExtension);
    }
    Ok(UrlExtension { critical, oid, value })
}

fn percent_decode(raw: &str) -> Result<String, UrlError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let mut byte = [0u8; 1];
            bytes
                .get(i + 1..i + 3)
                .and_then(|h| hex::decode_to_slice(h, &mut byte).ok())
                .ok_or_else(|| UrlError::BadPercentEncoding(raw.to_string()))?;
            out.push(byte[0]);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| UrlError::BadPercentEncoding(raw.to_string()))
}

/// Percent-encode everything outside the unreserved and sub-delim sets,
/// plus `?` and the bytes in `extra`.
fn percent_encode(f: &mut fmt::Formatter<'_>, s: &str, extra: &[u8]) -> fmt::Result {
    for &b in s.as_bytes() {
        let keep = (b.is_ascii_alphanumeric() || b"-._~!$&'()*+,;=:@".contains(&b)) && !extra.contains(&b);
        if keep {
            write!(f, "{}", b as char)?;
        } else {
            write!(f, "%{:02X}", b)?;
        }
    }
    Ok(())
}

impl fmt::Display for LdapUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme.as_str())?;
        if self.host.starts_with('[') {
            f.write_str(&self.host)?;
        } else {
            percent_encode(f, &self.host, b":")?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        f.write_str("/")?;
        percent_encode(f, &self.dn, b"")?;

        // Trailing empty components are omitted.
        let scope = match self.scope {
            SearchScope::BaseObject => "",
            SearchScope::SingleLevel => "one",
            SearchScope::WholeSubtree => "sub",
        };
        let tail = if !self.extensions.is_empty() {
            4
        } else if self.filter.is_some() {
            3
        } else if !scope.is_empty() {
            2
        } else if !self.attributes.is_empty() {
            1
        } else {
            0
        };

        if tail >= 1 {
            f.write_str("?")?;
            for (i, attr) in self.attributes.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                percent_encode(f, attr, b",")?;
            }
        }
        if tail >= 2 {
            write!(f, "?{}", scope)?;
        }
        if tail >= 3 {
            f.write_str("?")?;
            if let Some(filter) = &self.filter {
                percent_encode(f, &filter.to_string(), b"")?;
            }
        }
        if tail >= 4 {
            f.write_str("?")?;
            for (i, ext) in self.extensions.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                if ext.critical {
                    f.write_str("!")?;
                }
                percent_encode(f, &ext.oid, b",=")?;
                if let Some(value) = &ext.value {
                    f.write_str("=")?;
                    percent_encode(f, value, b",")?;
                }
            }
        }
        Ok(())
    }
}
