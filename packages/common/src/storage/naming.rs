use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;

/// Directory and file naming rules configured on a storage policy.
#[derive(Debug, Clone, Copy)]
pub struct NamingRules<'a> {
    pub dir_rule: &'a str,
    pub file_rule: &'a str,
}

/// Turns a logical file name into a backend source locator.
pub trait SourceNamer: Send + Sync {
    fn source_name(&self, rules: &NamingRules<'_>, owner_id: i32, origin_name: &str) -> String;
}

/// Default file rule used when a policy leaves its rule empty.
pub const DEFAULT_FILE_RULE: &str = "{randomkey8}_{originname}";

/// Expands the placeholder syntax used in policy naming rules.
///
/// Supported placeholders: `{uid}`, `{randomkey8}`, `{randomkey16}`,
/// `{uuid}`, `{date}` (`YYYYMMDD`), `{timestamp}`, `{originname}` and
/// `{ext}` (extension including the dot, empty when there is none).
/// Random placeholders make two expansions of the same rule differ.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleNamer;

impl RuleNamer {
    fn expand(rule: &str, owner_id: i32, origin_name: &str) -> String {
        let now = Utc::now();
        let ext = origin_name
            .rfind('.')
            .filter(|idx| *idx > 0)
            .map(|idx| &origin_name[idx..])
            .unwrap_or("");

        let mut out = rule.to_string();
        // Replaced one occurrence at a time so every random key is fresh.
        while out.contains("{randomkey8}") {
            out = out.replacen("{randomkey8}", &random_key(8), 1);
        }
        while out.contains("{randomkey16}") {
            out = out.replacen("{randomkey16}", &random_key(16), 1);
        }
        while out.contains("{uuid}") {
            out = out.replacen("{uuid}", &uuid::Uuid::new_v4().to_string(), 1);
        }
        out.replace("{uid}", &owner_id.to_string())
            .replace("{date}", &now.format("%Y%m%d").to_string())
            .replace("{timestamp}", &now.timestamp().to_string())
            .replace("{originname}", origin_name)
            .replace("{ext}", ext)
    }
}

impl SourceNamer for RuleNamer {
    fn source_name(&self, rules: &NamingRules<'_>, owner_id: i32, origin_name: &str) -> String {
        let origin_name = sanitize(origin_name);
        let file_rule = if rules.file_rule.trim().is_empty() {
            DEFAULT_FILE_RULE
        } else {
            rules.file_rule
        };

        let dir = Self::expand(rules.dir_rule, owner_id, &origin_name);
        let file = sanitize(&Self::expand(file_rule, owner_id, &origin_name));

        let dir = dir.trim_matches('/');
        if dir.is_empty() {
            file
        } else {
            format!("{dir}/{file}")
        }
    }
}

fn random_key(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Strip path separators and parent references out of a single name.
fn sanitize(name: &str) -> String {
    let cleaned = name.replace(['/', '\\'], "_");
    if cleaned == ".." || cleaned == "." {
        "_".to_string()
    } else {
        cleaned
    }
}
