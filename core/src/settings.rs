//! The per-target settings map and its two wire encodings.
//!
//! `TargetSettings` maps target id → setting name → value, where a value is
//! either plain text or an opaque XML fragment. The map is built once per
//! broker session (re)initialization and mutated in place when the record
//! filter is re-applied. The merge rule makes repeated partial application
//! of the same source record idempotent: an explicit value, once stored,
//! cannot be erased by a later default-only pass.

use std::collections::BTreeMap;
use std::path::Path;

use pansearch_protocol::wire::ParseError;
use quick_xml::Reader;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use tracing::debug;

use crate::error::{EngineError, Result};

/// Name of the record-filter setting managed by [`TargetSettings::set_record_filter`].
pub const RECORD_FILTER_KEY: &str = "pz:recordfilter";

/// A single setting value: plain text or an opaque XML fragment. The two are
/// mutually exclusive per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Text(String),
    Xml(String),
}

impl SettingValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            SettingValue::Xml(_) => None,
        }
    }

    fn is_empty_text(&self) -> bool {
        matches!(self, SettingValue::Text(s) if s.is_empty())
    }
}

/// target id → setting name → value. BTreeMaps keep both encodings
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSettings {
    entries: BTreeMap<String, BTreeMap<String, SettingValue>>,
}

impl TargetSettings {
    pub fn new() -> Self {
        TargetSettings::default()
    }

    /// Store a setting with default fallback. The effective value is `value`
    /// when non-empty, otherwise `default`. A call with neither creates
    /// nothing; a default-only call never overwrites an established
    /// non-empty value, so re-applying the same record is idempotent.
    pub fn set_setting(
        &mut self,
        target: &str,
        key: &str,
        value: Option<&str>,
        default: Option<&str>,
    ) {
        let value = value.filter(|v| !v.is_empty());
        let effective = match (value, default) {
            (Some(v), _) => v,
            (None, Some(d)) => d,
            (None, None) => return,
        };
        let slot = self
            .entries
            .entry(target.to_string())
            .or_default()
            .entry(key.to_string());
        match slot {
            std::collections::btree_map::Entry::Occupied(mut occupied) => {
                let defaulted = value.is_none();
                let established = !occupied.get().is_empty_text();
                if defaulted && established {
                    return;
                }
                occupied.insert(SettingValue::Text(effective.to_string()));
            }
            std::collections::btree_map::Entry::Vacant(vacant) => {
                vacant.insert(SettingValue::Text(effective.to_string()));
            }
        }
    }

    /// Store an opaque XML fragment under a setting name.
    pub fn set_setting_xml(&mut self, target: &str, key: &str, fragment: &str) {
        self.entries
            .entry(target.to_string())
            .or_default()
            .insert(key.to_string(), SettingValue::Xml(fragment.to_string()));
    }

    /// Apply a record filter across all known targets. A target receives the
    /// filter when the criteria is absent or textually contains its id;
    /// otherwise any existing filter setting is removed.
    pub fn set_record_filter(&mut self, filter: &str, criteria: Option<&str>) {
        for (target, settings) in &mut self.entries {
            let applies = match criteria {
                None => true,
                Some(c) if c.is_empty() => true,
                Some(c) => c.contains(target.as_str()),
            };
            if applies {
                settings.insert(
                    RECORD_FILTER_KEY.to_string(),
                    SettingValue::Text(filter.to_string()),
                );
            } else {
                settings.remove(RECORD_FILTER_KEY);
            }
        }
    }

    /// Remove the record-filter setting from every target (the caller no
    /// longer supplies a filter).
    pub fn clear_record_filter(&mut self) {
        for settings in self.entries.values_mut() {
            settings.remove(RECORD_FILTER_KEY);
        }
    }

    pub fn get(&self, target: &str, key: &str) -> Option<&SettingValue> {
        self.entries.get(target)?.get(key)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }

    /// URL-encoded assignment list: `name[target]=value&…`. XML-valued
    /// entries are skipped (known gap, preserved as observed behavior).
    /// `None` when there is nothing to encode.
    pub fn encode(&self) -> Option<String> {
        let mut pairs: Vec<String> = Vec::new();
        for (target, settings) in &self.entries {
            for (name, value) in settings {
                let Some(text) = value.as_text() else {
                    debug!(target_id = %target, setting = %name, "skipping XML-valued setting in URL encoding");
                    continue;
                };
                pairs.push(format!(
                    "{}[{}]={}",
                    urlencoding::encode(name),
                    urlencoding::encode(target),
                    urlencoding::encode(text)
                ));
            }
        }
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("&"))
        }
    }

    /// Protocol XML: `<settings target="*">` wrapping one `<set/>` per
    /// entry. XML-valued entries are skipped, as in [`TargetSettings::encode`].
    pub fn to_xml(&self) -> String {
        let mut writer = quick_xml::Writer::new(Vec::new());
        let mut root = BytesStart::new("settings");
        root.push_attribute(("target", "*"));
        let _ = writer.write_event(Event::Start(root));
        for (target, settings) in &self.entries {
            for (name, value) in settings {
                let Some(text) = value.as_text() else {
                    continue;
                };
                let mut set = BytesStart::new("set");
                set.push_attribute(("target", target.as_str()));
                set.push_attribute(("name", name.as_str()));
                set.push_attribute(("value", text));
                let _ = writer.write_event(Event::Empty(set));
            }
        }
        let _ = writer.write_event(Event::End(BytesEnd::new("settings")));
        String::from_utf8_lossy(&writer.into_inner()).into_owned()
    }

    /// Load a settings document from a local file (the static-settings
    /// variant). Accepts the same `<settings>` XML the broker accepts: a
    /// `<set>` may carry a `value` attribute or wrap an XML fragment, and a
    /// `target` attribute on the root applies to sets without their own.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!(
                "cannot read settings file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_xml(&text)
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut out = TargetSettings::new();
        let mut root_target: Option<String> = None;
        loop {
            match reader.read_event().map_err(ParseError::Xml)? {
                Event::Start(e) if e.name().as_ref() == b"settings" => {
                    root_target = attr_value(&e, b"target")?;
                }
                Event::Empty(e) if e.name().as_ref() == b"set" => {
                    let (target, name) = set_coordinates(&e, root_target.as_deref())?;
                    if let Some(value) = attr_value(&e, b"value")? {
                        out.set_setting(&target, &name, Some(&value), None);
                    }
                }
                Event::Start(e) if e.name().as_ref() == b"set" => {
                    let (target, name) = set_coordinates(&e, root_target.as_deref())?;
                    match attr_value(&e, b"value")? {
                        Some(value) => {
                            out.set_setting(&target, &name, Some(&value), None);
                            reader.read_to_end(e.name()).map_err(ParseError::Xml)?;
                        }
                        None => {
                            let fragment = reader
                                .read_text(e.name())
                                .map_err(ParseError::Xml)?
                                .into_owned();
                            let fragment = fragment.trim();
                            if !fragment.is_empty() {
                                out.set_setting_xml(&target, &name, fragment);
                            }
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Resolve the `(target, name)` pair of a `<set>` element, falling back to
/// the root element's `target` attribute.
fn set_coordinates(
    el: &BytesStart<'_>,
    root_target: Option<&str>,
) -> Result<(String, String)> {
    let target = attr_value(el, b"target")?
        .or_else(|| root_target.map(str::to_string))
        .ok_or_else(|| {
            EngineError::Configuration("settings file has a <set> with no target".to_string())
        })?;
    let name = attr_value(el, b"name")?.ok_or_else(|| {
        EngineError::Configuration("settings file has a <set> with no name".to_string())
    })?;
    Ok((target, name))
}

fn attr_value(el: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in el.attributes() {
        let attr = attr.map_err(quick_xml::Error::from).map_err(ParseError::Xml)?;
        if attr.key.as_ref() == name {
            let value = attr.unescape_value().map_err(ParseError::Xml)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
