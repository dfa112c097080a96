use std::collections::HashMap;
use tracing::warn;

const CAP_SUFFIX: &str = ".Size";

fn parse_flag(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_cap(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// Whether the operation under `key` (`"<collection>.<Operation>"`) is audited.
/// A present, parseable setting overrides `default`; anything else keeps it.
pub fn should_audit(default: bool, settings: &HashMap<String, String>, key: &str) -> bool {
    settings
        .get(key)
        .and_then(|raw| parse_flag(raw))
        .unwrap_or(default)
}

/// Trail cap for `audit_collection`, read from `"<auditCollection>.Size"`.
pub fn resolve_cap_size(
    settings: &HashMap<String, String>,
    audit_collection: &str,
    default: i64,
) -> i64 {
    settings
        .get(&format!("{}{}", audit_collection, CAP_SUFFIX))
        .and_then(|raw| parse_cap(raw))
        .unwrap_or(default)
}

/// Audit settings validated once. Entries that do not parse are logged and
/// discarded, so lookups fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditPolicy {
    audit_by_default: bool,
    default_cap: i64,
    flags: HashMap<String, bool>,
    caps: HashMap<String, i64>,
}

impl AuditPolicy {
    pub fn new(audit_by_default: bool, default_cap: i64, settings: &HashMap<String, String>) -> Self {
        let mut flags = HashMap::new();
        let mut caps = HashMap::new();

        for (key, raw) in settings {
            if let Some(collection) = key.strip_suffix(CAP_SUFFIX) {
                match parse_cap(raw) {
                    Some(cap) => {
                        caps.insert(collection.to_string(), cap);
                    }
                    None => warn!(key = %key, value = %raw, "ignoring audit cap that is not an integer"),
                }
            } else {
                match parse_flag(raw) {
                    Some(flag) => {
                        flags.insert(key.clone(), flag);
                    }
                    None => warn!(key = %key, value = %raw, "ignoring audit flag that is not a boolean"),
                }
            }
        }

        Self {
            audit_by_default,
            default_cap,
            flags,
            caps,
        }
    }

    pub fn should_audit(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(self.audit_by_default)
    }

    /// Raw cap for `audit_collection`, before the uncapped mapping.
    pub fn cap_size(&self, audit_collection: &str) -> i64 {
        self.caps
            .get(audit_collection)
            .copied()
            .unwrap_or(self.default_cap)
    }

    /// Number of snapshots kept per entity. Zero means no limit.
    pub fn retained(&self, audit_collection: &str) -> usize {
        usize::try_from(self.cap_size(audit_collection)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_should_audit_overrides_and_fails_open() {
        let s = settings(&[("cards.Save", "false"), ("cards.Update", "maybe"), ("cards.Create", " TRUE ")]);
        assert!(!should_audit(true, &s, "cards.Save"));
        assert!(should_audit(true, &s, "cards.Update"));
        assert!(!should_audit(false, &s, "cards.Update"));
        assert!(should_audit(false, &s, "cards.Create"));
        assert!(should_audit(true, &s, "cards.Missing"));
    }

    #[test]
    fn test_cap_size_resolution() {
        let s = settings(&[("cardsAudit.Size", "5"), ("badAudit.Size", "lots")]);
        assert_eq!(resolve_cap_size(&s, "cardsAudit", 100), 5);
        assert_eq!(resolve_cap_size(&s, "badAudit", 100), 100);
        assert_eq!(resolve_cap_size(&s, "otherAudit", 100), 100);
    }

    #[test]
    fn test_policy_matches_the_free_functions() {
        let s = settings(&[
            ("cards.Save", "False"),
            ("cards.Update", "nope"),
            ("cardsAudit.Size", "3"),
            ("badAudit.Size", "x"),
        ]);
        let policy = AuditPolicy::new(true, 100, &s);
        for key in ["cards.Save", "cards.Update", "cards.Other"] {
            assert_eq!(policy.should_audit(key), should_audit(true, &s, key), "{key}");
        }
        for coll in ["cardsAudit", "badAudit", "otherAudit"] {
            assert_eq!(policy.cap_size(coll), resolve_cap_size(&s, coll, 100), "{coll}");
        }
    }

    #[test]
    fn test_non_positive_caps_are_unbounded() {
        let s = settings(&[("aAudit.Size", "0"), ("bAudit.Size", "-4"), ("cAudit.Size", "7")]);
        let policy = AuditPolicy::new(true, 100, &s);
        assert_eq!(policy.retained("aAudit"), 0);
        assert_eq!(policy.retained("bAudit"), 0);
        assert_eq!(policy.retained("cAudit"), 7);
        assert_eq!(policy.retained("dAudit"), 100);
    }
}
