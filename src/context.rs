//! `InterfaceContext`: typed, URI-derivable configuration for an [`Interface`](crate::interface::Interface).
//!
//! Mirrors the defaulting rules of the original `sioba.context.InterfaceContext`:
//! built-in defaults, then a caller-supplied default context, then explicit
//! overrides, then (for [`InterfaceContext::from_uri`]) query-string values
//! coerced to each field's declared type.

use std::collections::HashMap;

use url::Url;

use crate::error::{Result, SiobaError};

pub const DEFAULT_ROWS: u16 = 24;
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_AUTO_SHUTDOWN: bool = true;
pub const DEFAULT_SCROLLBACK_BUFFER_URI: &str = "terminal://";
pub const DEFAULT_SCROLLBACK_BUFFER_SIZE: usize = 10_000;
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Configuration record for an interface. Every field is `Option` (or an
/// empty collection) until [`with_defaults`](Self::with_defaults) /
/// [`from_uri`](Self::from_uri) fill it in; after merging, every field the
/// core reads is non-`unset` — untouched fields simply read as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceContext {
    pub uri: Option<String>,
    pub scheme: Option<String>,
    pub netloc: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub path: Option<String>,
    pub params: Option<String>,
    pub query: HashMap<String, Vec<String>>,

    pub rows: Option<u16>,
    pub cols: Option<u16>,
    pub title: Option<String>,

    pub cursor_row: Option<u32>,
    pub cursor_col: Option<u32>,

    pub encoding: Option<String>,
    pub convert_eol: Option<bool>,
    pub auto_shutdown: Option<bool>,
    pub local_echo: Option<bool>,

    pub scrollback_buffer_uri: Option<String>,
    pub scrollback_buffer_size: Option<usize>,

    /// Free-form transport-specific extensions not promoted to a field.
    pub extra_params: HashMap<String, String>,
}

macro_rules! scalar_fields {
    ($macro_name:ident) => {
        $macro_name!(uri);
        $macro_name!(scheme);
        $macro_name!(netloc);
        $macro_name!(host);
        $macro_name!(port);
        $macro_name!(username);
        $macro_name!(password);
        $macro_name!(path);
        $macro_name!(params);
        $macro_name!(rows);
        $macro_name!(cols);
        $macro_name!(title);
        $macro_name!(cursor_row);
        $macro_name!(cursor_col);
        $macro_name!(encoding);
        $macro_name!(convert_eol);
        $macro_name!(auto_shutdown);
        $macro_name!(local_echo);
        $macro_name!(scrollback_buffer_uri);
        $macro_name!(scrollback_buffer_size);
    };
}

impl InterfaceContext {
    fn builtin_defaults() -> Self {
        Self {
            rows: Some(DEFAULT_ROWS),
            cols: Some(DEFAULT_COLS),
            title: Some(String::new()),
            cursor_row: Some(0),
            cursor_col: Some(0),
            encoding: Some(DEFAULT_ENCODING.to_string()),
            local_echo: Some(false),
            scrollback_buffer_uri: Some(DEFAULT_SCROLLBACK_BUFFER_URI.to_string()),
            scrollback_buffer_size: Some(DEFAULT_SCROLLBACK_BUFFER_SIZE),
            auto_shutdown: Some(DEFAULT_AUTO_SHUTDOWN),
            ..Default::default()
        }
    }

    /// Merge order: built-in defaults ← `default_context` ← `overrides`.
    /// Fields untouched by either stay `None`.
    pub fn with_defaults(default_context: Option<&Self>, overrides: Self) -> Self {
        let mut ctx = Self::builtin_defaults();
        if let Some(dc) = default_context {
            ctx.update(dc);
        }
        ctx.update(&overrides);
        ctx
    }

    /// Parse `uri`, coerce every query key that matches a field name, then
    /// apply `with_defaults` semantics on top (`default_context` ← `overrides`).
    pub fn from_uri(uri: &str, default_context: Option<&Self>, overrides: Self) -> Result<Self> {
        let parsed = Url::parse(uri).map_err(|e| SiobaError::Transport(Box::new(e)))?;

        let mut query: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in parsed.query_pairs() {
            query.entry(k.into_owned()).or_default().push(v.into_owned());
        }

        let mut ctx = Self {
            uri: Some(uri.to_string()),
            scheme: Some(parsed.scheme().to_string()),
            netloc: Some(build_netloc(&parsed)),
            host: parsed.host_str().map(str::to_string),
            port: parsed.port(),
            username: non_empty(parsed.username()),
            password: parsed.password().map(str::to_string),
            path: Some(parsed.path().to_string()),
            query: query.clone(),
            ..Self::default()
        };
        apply_query(&mut ctx, &query);
        ctx.update(&overrides);

        Ok(Self::with_defaults(default_context, ctx))
    }

    /// Overwrite every field in `self` that is `Some`/non-empty in `other`.
    pub fn update(&mut self, other: &Self) -> &mut Self {
        macro_rules! take {
            ($f:ident) => {
                if other.$f.is_some() {
                    self.$f = other.$f.clone();
                }
            };
        }
        scalar_fields!(take);
        if !other.query.is_empty() {
            self.query = other.query.clone();
        }
        if !other.extra_params.is_empty() {
            self.extra_params = other.extra_params.clone();
        }
        self
    }

    /// Fill only the fields currently `None` in `self` from `other`.
    pub fn fill_missing(&mut self, other: &Self) -> &mut Self {
        macro_rules! take {
            ($f:ident) => {
                if self.$f.is_none() {
                    self.$f = other.$f.clone();
                }
            };
        }
        scalar_fields!(take);
        if self.query.is_empty() {
            self.query = other.query.clone();
        }
        if self.extra_params.is_empty() {
            self.extra_params = other.extra_params.clone();
        }
        self
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Look up `key` among the declared fields first, falling through to
    /// `query` then `extra_params`.
    pub fn get(&self, key: &str) -> Option<String> {
        let from_field = match key {
            "uri" => self.uri.clone(),
            "scheme" => self.scheme.clone(),
            "netloc" => self.netloc.clone(),
            "host" => self.host.clone(),
            "port" => self.port.map(|v| v.to_string()),
            "username" => self.username.clone(),
            "password" => self.password.clone(),
            "path" => self.path.clone(),
            "params" => self.params.clone(),
            "rows" => self.rows.map(|v| v.to_string()),
            "cols" => self.cols.map(|v| v.to_string()),
            "title" => self.title.clone(),
            "cursor_row" => self.cursor_row.map(|v| v.to_string()),
            "cursor_col" => self.cursor_col.map(|v| v.to_string()),
            "encoding" => self.encoding.clone(),
            "convertEol" => self.convert_eol.map(|v| v.to_string()),
            "auto_shutdown" => self.auto_shutdown.map(|v| v.to_string()),
            "local_echo" => self.local_echo.map(|v| v.to_string()),
            "scrollback_buffer_uri" => self.scrollback_buffer_uri.clone(),
            "scrollback_buffer_size" => self.scrollback_buffer_size.map(|v| v.to_string()),
            _ => None,
        };
        from_field
            .or_else(|| self.query.get(key).and_then(|v| v.first()).cloned())
            .or_else(|| self.extra_params.get(key).cloned())
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn build_netloc(parsed: &Url) -> String {
    let mut out = String::new();
    if !parsed.username().is_empty() {
        out.push_str(parsed.username());
        if let Some(pw) = parsed.password() {
            out.push(':');
            out.push_str(pw);
        }
        out.push('@');
    }
    if let Some(host) = parsed.host_str() {
        out.push_str(host);
    }
    if let Some(port) = parsed.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "1" | "true" | "yes")
}

fn apply_query(ctx: &mut InterfaceContext, query: &HashMap<String, Vec<String>>) {
    let first = |key: &str| query.get(key).and_then(|v| v.first()).cloned();

    if let Some(v) = first("rows") {
        ctx.rows = v.parse().ok();
    }
    if let Some(v) = first("cols") {
        ctx.cols = v.parse().ok();
    }
    if let Some(v) = first("title") {
        ctx.title = Some(v);
    }
    if let Some(v) = first("encoding") {
        ctx.encoding = Some(v);
    }
    if let Some(v) = first("convertEol") {
        ctx.convert_eol = Some(parse_bool(&v));
    }
    if let Some(v) = first("auto_shutdown") {
        ctx.auto_shutdown = Some(parse_bool(&v));
    }
    if let Some(v) = first("local_echo") {
        ctx.local_echo = Some(parse_bool(&v));
    }
    if let Some(v) = first("scrollback_buffer_uri") {
        ctx.scrollback_buffer_uri = Some(v);
    }
    if let Some(v) = first("scrollback_buffer_size") {
        ctx.scrollback_buffer_size = v.parse().ok();
    }
    if let Some(v) = first("cursor_row") {
        ctx.cursor_row = v.parse().ok();
    }
    if let Some(v) = first("cursor_col") {
        ctx.cursor_col = v.parse().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_defaults_fills_unset_fields() {
        let ctx = InterfaceContext::with_defaults(None, InterfaceContext::default());
        assert_eq!(ctx.rows, Some(DEFAULT_ROWS));
        assert_eq!(ctx.cols, Some(DEFAULT_COLS));
        assert_eq!(ctx.auto_shutdown, Some(true));
        assert_eq!(ctx.convert_eol, None);
    }

    #[test]
    fn default_context_applies_before_overrides() {
        let default_context = InterfaceContext {
            convert_eol: Some(true),
            ..Default::default()
        };
        let overrides = InterfaceContext {
            convert_eol: Some(false),
            ..Default::default()
        };
        let ctx = InterfaceContext::with_defaults(Some(&default_context), overrides);
        assert_eq!(ctx.convert_eol, Some(false));
    }

    #[test]
    fn from_uri_coerces_query_types() {
        let ctx = InterfaceContext::from_uri(
            "tcp://h:1?rows=52&cols=100&convertEol=0",
            None,
            InterfaceContext::default(),
        )
        .unwrap();
        assert_eq!(ctx.host.as_deref(), Some("h"));
        assert_eq!(ctx.port, Some(1));
        assert_eq!(ctx.rows, Some(52));
        assert_eq!(ctx.cols, Some(100));
        assert_eq!(ctx.convert_eol, Some(false));
    }

    #[test]
    fn from_uri_keeps_extra_keys_in_query() {
        let ctx = InterfaceContext::from_uri("exec:///bin/bash?arg=-c&arg=pwd", None, InterfaceContext::default())
            .unwrap();
        assert_eq!(ctx.query.get("arg"), Some(&vec!["-c".to_string(), "pwd".to_string()]));
    }

    #[test]
    fn get_falls_through_to_query_then_extra_params() {
        let mut ctx = InterfaceContext::default();
        ctx.query.insert("baudrate".to_string(), vec!["9600".to_string()]);
        ctx.extra_params.insert("flavor".to_string(), "spicy".to_string());
        assert_eq!(ctx.get("baudrate").as_deref(), Some("9600"));
        assert_eq!(ctx.get("flavor").as_deref(), Some("spicy"));
        assert_eq!(ctx.get("nope"), None);
    }

    #[test]
    fn fill_missing_only_touches_none_fields() {
        let mut ctx = InterfaceContext {
            rows: Some(10),
            ..Default::default()
        };
        let defaults = InterfaceContext {
            rows: Some(24),
            cols: Some(80),
            ..Default::default()
        };
        ctx.fill_missing(&defaults);
        assert_eq!(ctx.rows, Some(10));
        assert_eq!(ctx.cols, Some(80));
    }
}
