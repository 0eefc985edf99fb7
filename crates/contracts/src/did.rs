//! DID and CAIP-10 helpers.
//!
//! Only the shape `did:<method>:<id>` is checked here. Method-specific
//! interpretation (domains for `did:web`, account addresses for `did:pkh`)
//! is exposed through small accessors so callers never re-split strings.

use std::sync::LazyLock;

use regex::Regex;

static DID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^did:[a-z0-9]+:[A-Za-z0-9._%:\-]+$").expect("did pattern must compile")
});

pub fn is_did(s: &str) -> bool {
    DID.is_match(s) && !s.ends_with(':')
}

/// Method name of a DID, e.g. `web` for `did:web:example.com`.
pub fn did_method(did: &str) -> Option<&str> {
    let rest = did.strip_prefix("did:")?;
    let (method, id) = rest.split_once(':')?;
    (!method.is_empty() && !id.is_empty()).then_some(method)
}

/// Host (and optional port) named by a `did:web` identifier.
///
/// `did:web:example.com:users:alice` resolves to `example.com`;
/// a percent-encoded port (`localhost%3A8443`) is decoded.
pub fn did_web_domain(did: &str) -> Option<String> {
    let id = did.strip_prefix("did:web:")?;
    let host = id.split(':').next()?.trim();
    if host.is_empty() {
        return None;
    }
    let host = host.replace("%3A", ":").replace("%3a", ":");
    Some(host.to_ascii_lowercase())
}

/// Domain without a port, suitable for DNS names.
pub fn strip_port(domain: &str) -> &str {
    match domain.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => domain,
    }
}

/// Account address carried by a controller identifier: the last
/// `:`-separated segment (`did:pkh:eip155:1:0xabc` yields `0xabc`).
pub fn embedded_address(controller: &str) -> Option<&str> {
    let segment = controller.rsplit(':').next()?.trim();
    (!segment.is_empty()).then_some(segment)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caip10 {
    pub namespace: String,
    pub chain_reference: String,
    pub address: String,
}

impl Caip10 {
    /// Parses `<namespace>:<reference>:<address>`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().splitn(3, ':');
        let namespace = parts.next()?.trim();
        let chain_reference = parts.next()?.trim();
        let address = parts.next()?.trim();
        if namespace.is_empty()
            || chain_reference.is_empty()
            || address.is_empty()
            || address.contains(':')
        {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            chain_reference: chain_reference.to_string(),
            address: address.to_string(),
        })
    }

    pub fn address_matches(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}
