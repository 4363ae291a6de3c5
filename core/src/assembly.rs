//! Settings assembly: registry records in, per-target settings out.
//!
//! Each searchable record is reduced to one settings entry set for its
//! target. Assembly is deliberately re-runnable: everything optional goes
//! through [`TargetSettings::set_setting`] with a default, so applying the
//! same record twice cannot clobber an explicit value with a fallback.

use tracing::warn;

use crate::config::AssemblyPolicy;
use crate::registry::TargetRecord;
use crate::settings::TargetSettings;

/// Build the settings map for a collection of registry records.
pub fn assemble(records: &[TargetRecord], policy: &AssemblyPolicy) -> TargetSettings {
    let mut settings = TargetSettings::new();
    for record in records {
        apply_record(&mut settings, record, policy);
    }
    settings
}

/// Apply a single record. A record that yields no target id is dropped.
pub fn apply_record(
    settings: &mut TargetSettings,
    record: &TargetRecord,
    policy: &AssemblyPolicy,
) {
    let constructed_url = construct_url(record);
    let target = match target_id(record, constructed_url.as_deref(), policy) {
        Some(t) => t,
        None => {
            warn!(
                name = record.name.as_deref().unwrap_or("<unnamed>"),
                "dropping registry record with no identifying URL and no opaque id"
            );
            return;
        }
    };
    let target = target.as_str();

    if let Some(url) = &constructed_url {
        settings.set_setting(target, "pz:url", Some(url), None);
    }
    apply_native_syntax(settings, target, record, policy);
    apply_prefixed_maps(settings, target, record);
    apply_ccl_defaults(settings, target, record, policy);
    apply_scalars(settings, target, record);
}

/// Target id selection: the opaque record id when the policy allows and one
/// exists, otherwise the constructed URL, otherwise the id as a last resort.
fn target_id(
    record: &TargetRecord,
    constructed_url: Option<&str>,
    policy: &AssemblyPolicy,
) -> Option<String> {
    if policy.use_opaque_ids {
        if let Some(id) = &record.id {
            return Some(id.clone());
        }
    }
    if let Some(url) = constructed_url {
        return Some(url.to_string());
    }
    record.id.clone()
}

/// Build the target URL from the record: base z-server URL, a trailing path
/// separator when the URL is a bare host:port, the `targetmap_` rich
/// database parameters, and content-filter auth details when present.
fn construct_url(record: &TargetRecord) -> Option<String> {
    let base = record.z_url.as_deref()?;
    let mut url = base.to_string();
    if is_bare_host_port(base) {
        url.push('/');
    }
    let mut params: Vec<(String, String)> = record
        .database_params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some(cf_auth) = &record.cf_auth {
        let (user, password) = match cf_auth.split_once('/') {
            Some((u, p)) => (u, p),
            None => (cf_auth.as_str(), ""),
        };
        params.push(("user".to_string(), user.to_string()));
        params.push(("password".to_string(), password.to_string()));
        if let Some(subdb) = &record.cf_subdb {
            params.push(("subdatabase".to_string(), subdb.clone()));
        }
        if let Some(proxy) = &record.cf_proxy {
            params.push(("proxy".to_string(), proxy.clone()));
        }
    }
    for (i, (name, value)) in params.iter().enumerate() {
        url.push(if i == 0 { '?' } else { '&' });
        url.push_str(&urlencoding::encode(name));
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
    Some(url)
}

/// `host:port` with no path component.
fn is_bare_host_port(url: &str) -> bool {
    match url.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty()
                && !host.contains('/')
                && !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Native-syntax negotiation. Plain XML targets get no override; MARC-family
/// targets get turbomarc when the policy allows it and the transform (if
/// any) is turbomarc-flavored, otherwise raw ISO2709. The record encoding
/// defaults to MARC8.
fn apply_native_syntax(
    settings: &mut TargetSettings,
    target: &str,
    record: &TargetRecord,
    policy: &AssemblyPolicy,
) {
    let Some(syntax) = record.request_syntax.as_deref() else {
        return;
    };
    if syntax.eq_ignore_ascii_case("xml") {
        return;
    }
    let encoding = record.record_encoding.as_deref().unwrap_or("MARC8");
    let lowered = syntax.to_ascii_lowercase();
    let marc_family = lowered.contains("marc") || lowered.contains("opac");
    let transform_fits = match record.transform.as_deref() {
        None => true,
        Some(t) => t.contains("tmarc") || t.contains("turbomarc"),
    };
    let value = if policy.use_turbo_marc && marc_family && transform_fits {
        format!("txml;{encoding}")
    } else {
        format!("iso2709;{encoding}")
    };
    settings.set_setting(target, "pz:nativesyntax", Some(&value), None);
}

/// `cclmap_*`, `facetmap_*`, `limitmap_*`, `sortmap_*` fields, verbatim.
fn apply_prefixed_maps(settings: &mut TargetSettings, target: &str, record: &TargetRecord) {
    for (name, value) in &record.ccl_maps {
        settings.set_setting(target, &format!("pz:cclmap:{name}"), Some(value), None);
    }
    for (name, value) in &record.facet_maps {
        settings.set_setting(target, &format!("pz:facetmap:{name}"), Some(value), None);
    }
    for (name, value) in &record.limit_maps {
        settings.set_setting(target, &format!("pz:limitmap:{name}"), Some(value), None);
    }
    for (name, value) in &record.sort_maps {
        settings.set_setting(target, &format!("pz:sortmap:{name}"), Some(value), None);
    }
}

/// The eight well-known CCL indexes, under their configured key names with
/// configured fallbacks. `pz:cclmap:term` is the one mandatory index: it is
/// asserted under its canonical name even when the term key is renamed.
fn apply_ccl_defaults(
    settings: &mut TargetSettings,
    target: &str,
    record: &TargetRecord,
    policy: &AssemblyPolicy,
) {
    for (canonical, ccl) in policy.ccl_defaults.entries() {
        let supplied = record.ccl_maps.get(canonical).map(String::as_str);
        settings.set_setting(
            target,
            &format!("pz:cclmap:{}", ccl.key),
            supplied,
            Some(&ccl.fallback),
        );
    }
    let term = &policy.ccl_defaults.term;
    let supplied = record.ccl_maps.get("term").map(String::as_str);
    settings.set_setting(target, "pz:cclmap:term", supplied, Some(&term.fallback));
}

/// The remaining scalar settings, 1:1 with the record fields, defaulted
/// where documented.
fn apply_scalars(settings: &mut TargetSettings, target: &str, record: &TargetRecord) {
    let auth = record.cf_auth.as_deref().or(record.auth.as_deref());
    fn opt(v: &Option<String>) -> Option<&str> {
        v.as_deref()
    }

    settings.set_setting(target, "pz:name", opt(&record.name), None);
    settings.set_setting(target, "pz:xslt", opt(&record.transform), None);
    settings.set_setting(target, "pz:elements", opt(&record.element_set), None);
    settings.set_setting(target, "pz:requestsyntax", opt(&record.request_syntax), None);
    settings.set_setting(target, "pz:queryencoding", opt(&record.query_encoding), None);
    settings.set_setting(target, "pz:authentication", auth, None);
    settings.set_setting(target, "pz:sru", opt(&record.sru), None);
    settings.set_setting(target, "pz:sruversion", opt(&record.sru_version), None);
    settings.set_setting(target, "pz:apdulog", opt(&record.apdu_log), None);
    settings.set_setting(target, "pz:preferred", opt(&record.preferred), None);
    settings.set_setting(target, "pz:piggyback", opt(&record.piggyback), Some("1"));
    settings.set_setting(target, "pz:maxrecs", opt(&record.max_records), None);
    settings.set_setting(target, "pz:extra_args", opt(&record.extra_args), None);
    settings.set_setting(target, "pz:timeout", opt(&record.timeout), Some("60"));
    settings.set_setting(target, "pz:sessiontimeout", opt(&record.session_timeout), None);
    settings.set_setting(target, "block_timeout", opt(&record.block_timeout), None);
    settings.set_setting(target, "category", opt(&record.category), None);
    settings.set_setting(target, "comment", opt(&record.comment), None);
    settings.set_setting(target, "explode", opt(&record.explode), None);
    settings.set_setting(target, "url_recipe", opt(&record.url_recipe), None);
    settings.set_setting(target, "use_url_proxy", opt(&record.use_url_proxy), Some("0"));
    settings.set_setting(target, "use_thumbnails", opt(&record.use_thumbnails), Some("1"));
    settings.set_setting(target, "full_text_target", opt(&record.full_text_target), Some("NO"));
    settings.set_setting(
        target,
        "secondary_request_syntax",
        opt(&record.secondary_request_syntax),
        None,
    );
}
