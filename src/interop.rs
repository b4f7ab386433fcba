//! Conversions between the codec model and `ldap3` client types, for code
//! that proxies between a decoded stream and an `ldap3` connection.

use crate::message::{Attribute, Control, DerefAliases, LdapResult, ResultCode, SearchResultEntry, SearchScope};
use ldap3::controls::RawControl;

impl From<ldap3::Scope> for SearchScope {
    fn from(scope: ldap3::Scope) -> Self {
        match scope {
            ldap3::Scope::Base => SearchScope::BaseObject,
            ldap3::Scope::OneLevel => SearchScope::SingleLevel,
            ldap3::Scope::Subtree => SearchScope::WholeSubtree,
        }
    }
}

impl From<SearchScope> for ldap3::Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::BaseObject => ldap3::Scope::Base,
            SearchScope::SingleLevel => ldap3::Scope::OneLevel,
            SearchScope::WholeSubtree => ldap3::Scope::Subtree,
        }
    }
}

impl From<ldap3::DerefAliases> for DerefAliases {
    fn from(deref: ldap3::DerefAliases) -> Self {
        match deref {
            ldap3::DerefAliases::Never => DerefAliases::Never,
            ldap3::DerefAliases::Searching => DerefAliases::InSearching,
            ldap3::DerefAliases::Finding => DerefAliases::FindingBaseObj,
            ldap3::DerefAliases::Always => DerefAliases::Always,
        }
    }
}

impl From<DerefAliases> for ldap3::DerefAliases {
    fn from(deref: DerefAliases) -> Self {
        match deref {
            DerefAliases::Never => ldap3::DerefAliases::Never,
            DerefAliases::InSearching => ldap3::DerefAliases::Searching,
            DerefAliases::FindingBaseObj => ldap3::DerefAliases::Finding,
            DerefAliases::Always => ldap3::DerefAliases::Always,
        }
    }
}

impl From<RawControl> for Control {
    fn from(raw: RawControl) -> Self {
        Control {
            ctype: raw.ctype,
            critical: raw.crit,
            value: raw.val,
        }
    }
}

impl From<Control> for RawControl {
    fn from(control: Control) -> Self {
        RawControl {
            ctype: control.ctype,
            crit: control.critical,
            val: control.value,
        }
    }
}

/// Text and binary attributes merged, ordered by attribute name.
impl From<ldap3::SearchEntry> for SearchResultEntry {
    fn from(entry: ldap3::SearchEntry) -> Self {
        let text = entry.attrs.into_iter().map(|(attr_type, values)| Attribute {
            attr_type,
            attr_values: values.into_iter().map(String::into_bytes).collect(),
        });
        let binary = entry
            .bin_attrs
            .into_iter()
            .map(|(attr_type, attr_values)| Attribute { attr_type, attr_values });
        let mut attributes: Vec<Attribute> = text.chain(binary).collect();
        attributes.sort_by(|a, b| a.attr_type.cmp(&b.attr_type));
        SearchResultEntry {
            object_name: entry.dn,
            attributes,
        }
    }
}

/// Response controls are dropped; they travel separately in [`crate::message::LdapMessage`].
impl From<ldap3::LdapResult> for LdapResult {
    fn from(result: ldap3::LdapResult) -> Self {
        LdapResult {
            result_code: ResultCode::from_code(i32::try_from(result.rc).unwrap_or(i32::MAX)),
            matched_dn: result.matched,
            diagnostic_message: result.text,
            referral: if result.refs.is_empty() { None } else { Some(result.refs) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_scope_conversion() {
        for scope in [SearchScope::BaseObject, SearchScope::SingleLevel, SearchScope::WholeSubtree] {
            assert_eq!(SearchScope::from(ldap3::Scope::from(scope)), scope);
        }
        assert_eq!(ldap3::Scope::from(SearchScope::SingleLevel), ldap3::Scope::OneLevel);
    }

    #[test]
    fn test_deref_conversion() {
        for deref in [
            DerefAliases::Never,
            DerefAliases::InSearching,
            DerefAliases::FindingBaseObj,
            DerefAliases::Always,
        ] {
            assert_eq!(DerefAliases::from(ldap3::DerefAliases::from(deref)), deref);
        }
    }

    #[test]
    fn test_control_conversion() {
        let control = Control {
            ctype: "1.2.840.113556.1.4.319".to_string(),
            critical: true,
            value: Some(vec![0x30, 0x00]),
        };
        let raw = RawControl::from(control.clone());
        assert_eq!(raw.ctype, control.ctype);
        assert!(raw.crit);
        assert_eq!(Control::from(raw), control);
    }

    #[test]
    fn test_search_entry_conversion() {
        let entry = ldap3::SearchEntry {
            dn: "cn=john,dc=example".to_string(),
            attrs: HashMap::from([
                ("sn".to_string(), vec!["Smith".to_string()]),
                ("cn".to_string(), vec!["john".to_string(), "J".to_string()]),
            ]),
            bin_attrs: HashMap::from([("jpegPhoto".to_string(), vec![vec![0xFF, 0xD8]])]),
        };
        let converted = SearchResultEntry::from(entry);
        assert_eq!(converted.object_name, "cn=john,dc=example");
        let names: Vec<&str> = converted.attributes.iter().map(|a| a.attr_type.as_str()).collect();
        assert_eq!(names, vec!["cn", "jpegPhoto", "sn"]);
        assert_eq!(converted.attributes[0].attr_values, vec![b"john".to_vec(), b"J".to_vec()]);
        assert_eq!(converted.attributes[1].attr_values, vec![vec![0xFF, 0xD8]]);
    }

    #[test]
    fn test_result_conversion() {
        let result = ldap3::LdapResult {
            rc: 32,
            matched: "dc=example".to_string(),
            text: "no such object".to_string(),
            refs: vec![],
            ctrls: vec![],
        };
        let converted = LdapResult::from(result);
        assert_eq!(converted.result_code, ResultCode::NoSuchObject);
        assert_eq!(converted.matched_dn, "dc=example");
        assert_eq!(converted.referral, None);
    }
}
