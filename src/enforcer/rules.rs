//! pf ruleset text generation.
//!
//! Pure functions only; the controller decides where the text goes.

/// Services an allowlist block always lets through, as (proto, port).
/// Without them the allowed sites could not be resolved or reached.
const ALLOWLIST_ESSENTIALS: &[(&str, u16)] = &[
    ("tcp", 53),
    ("udp", 53),
    ("udp", 123),
    ("udp", 67),
    ("tcp", 67),
    ("udp", 68),
    ("tcp", 68),
    ("udp", 5353),
    ("tcp", 5353),
];

/// Validate that an address string is safe to interpolate into pf.conf
/// syntax: digits, hex, dots, colons only.
pub fn is_safe_pf_address(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ':' || ('a'..='f').contains(&c))
}

/// Builds anchor rulesets for one block mode.
#[derive(Debug, Clone)]
pub struct PfRuleBuilder {
    allowlist: bool,
    anchor_name: String,
}

impl PfRuleBuilder {
    pub fn new(allowlist: bool, anchor_name: impl Into<String>) -> Self {
        Self {
            allowlist,
            anchor_name: anchor_name.into(),
        }
    }

    pub fn is_allowlist(&self) -> bool {
        self.allowlist
    }

    /// Global options, plus a default deny of outbound TCP/UDP in
    /// allowlist mode.
    pub fn header(&self) -> String {
        let mut text = String::new();
        text.push_str("# Options\n");
        text.push_str("set block-policy drop\n");
        text.push_str("set fingerprints \"/etc/pf.os\"\n");
        text.push_str("set ruleset-optimization basic\n");
        text.push_str("set skip on lo0\n\n");
        text.push_str(&format!(
            "#\n# {} ruleset for SelfControl blocks\n#\n",
            self.anchor_name
        ));

        if self.allowlist {
            text.push_str("block return out proto tcp from any to any\n");
            text.push_str("block return out proto udp from any to any\n\n");
        }
        text
    }

    /// DNS, NTP, DHCP and mDNS pass rules. Empty in blocklist mode.
    pub fn allowlist_footer(&self) -> String {
        if !self.allowlist {
            return String::new();
        }
        ALLOWLIST_ESSENTIALS
            .iter()
            .map(|(proto, port)| format!("pass out proto {} from any to any port {}\n", proto, port))
            .collect()
    }

    /// TCP and UDP rule lines for one destination. `None` is any address
    /// and never carries a mask.
    pub fn rule_strings(&self, ip: Option<&str>, port: u16, mask_len: u8) -> [String; 2] {
        let mut target = match ip {
            Some(ip) if mask_len > 0 => format!("from any to {}/{}", ip, mask_len),
            Some(ip) => format!("from any to {}", ip),
            None => "from any to any".to_string(),
        };
        if port > 0 {
            target.push_str(&format!(" port {}", port));
        }

        let action = if self.allowlist { "pass" } else { "block return" };
        [
            format!("{} out proto tcp {}\n", action, target),
            format!("{} out proto udp {}\n", action, target),
        ]
    }

    /// Complete anchor file contents.
    pub fn build_config(&self, rules: &[String]) -> String {
        let mut config = self.header();
        for rule in rules {
            config.push_str(rule);
        }
        config.push_str(&self.allowlist_footer());
        config
    }
}
