// SPDX-License-Identifier: MIT OR Apache-2.0
//! The provenance path-schema DSL (spec.md §4.2): templates over named
//! variables with four constructs — literal substitution, truncation,
//! hashing, and hash-sharding into directory levels.

use crate::error::SchemaError;
use std::collections::HashMap;
use std::fmt::Write as _;
use sx_core::hash::{blake2b_256_hex, truncate_hex};

/// One parsed `{...}` construct from a template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    /// `{var}`
    Var(String),
    /// `{var[:N]}`
    Truncate(String, usize),
    /// `{hash(var)[:N]}`
    Hash(String, usize),
    /// `{shard(var, depth, width)}`
    Shard(String, usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Expr(Expr),
}

/// A validated path template: a sequence of literal and variable segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
    source: String,
}

impl Template {
    /// Parse and validate a template string.
    ///
    /// Validates balanced braces and that every `{...}` expression matches
    /// one of the four recognised constructs with a lowercase variable
    /// name. Does *not* check that referenced variables will be supplied
    /// at render time — that is checked by [`Template::render`], per the
    /// "unknown variables rejected at render time, not parse time" design
    /// decision.
    pub fn parse(source: &str) -> Result<Self, SchemaError> {
        if source.matches('{').count() != source.matches('}').count() {
            return Err(SchemaError::UnbalancedBraces(source.to_string()));
        }

        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 1..];
            let Some(close) = after_open.find('}') else {
                return Err(SchemaError::UnbalancedBraces(source.to_string()));
            };
            let inner = &after_open[..close];
            segments.push(Segment::Expr(parse_expr(inner)?));
            rest = &after_open[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            segments,
            source: source.to_string(),
        })
    }

    /// Render the template against a set of variable bindings.
    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String, SchemaError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(expr) => render_expr(expr, vars, &mut out)?,
            }
        }
        Ok(out)
    }

    /// The original template string this was parsed from.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn parse_expr(inner: &str) -> Result<Expr, SchemaError> {
    let fail = || SchemaError::InvalidExpression(inner.to_string());

    if let Some(rest) = inner.strip_prefix("hash(") {
        let (var, tail) = rest.split_once(')').ok_or_else(fail)?;
        let n = parse_trunc_suffix(tail).ok_or_else(fail)?;
        check_lowercase(var)?;
        return Ok(Expr::Hash(var.to_string(), n));
    }

    if let Some(rest) = inner.strip_prefix("shard(") {
        let rest = rest.strip_suffix(')').ok_or_else(fail)?;
        let parts: Vec<&str> = rest.split(',').map(str::trim).collect();
        let [var, depth, width] = parts.as_slice() else {
            return Err(fail());
        };
        check_lowercase(var)?;
        let depth: usize = depth.parse().map_err(|_| fail())?;
        let width: usize = width.parse().map_err(|_| fail())?;
        return Ok(Expr::Shard(var.to_string(), depth, width));
    }

    if let Some((var, tail)) = inner.split_once('[') {
        let n = tail
            .strip_prefix(':')
            .and_then(|t| t.strip_suffix(']'))
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(fail)?;
        check_lowercase(var)?;
        return Ok(Expr::Truncate(var.to_string(), n));
    }

    check_lowercase(inner)?;
    Ok(Expr::Var(inner.to_string()))
}

fn parse_trunc_suffix(tail: &str) -> Option<usize> {
    tail.strip_prefix("[:")?.strip_suffix(']')?.parse::<usize>().ok()
}

fn check_lowercase(var: &str) -> Result<(), SchemaError> {
    if var.is_empty() || var.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(SchemaError::UppercaseVariable(var.to_string()));
    }
    if !var.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
        return Err(SchemaError::InvalidExpression(var.to_string()));
    }
    Ok(())
}

fn lookup<'a>(vars: &'a HashMap<String, String>, name: &str) -> Result<&'a str, SchemaError> {
    vars.get(name)
        .map(String::as_str)
        .ok_or_else(|| SchemaError::UnknownVariable(name.to_string()))
}

fn render_expr(expr: &Expr, vars: &HashMap<String, String>, out: &mut String) -> Result<(), SchemaError> {
    match expr {
        Expr::Var(name) => out.push_str(lookup(vars, name)?),
        Expr::Truncate(name, n) => {
            let value = lookup(vars, name)?;
            out.push_str(&value.chars().take(*n).collect::<String>());
        }
        Expr::Hash(name, n) => {
            let value = lookup(vars, name)?;
            let digest = blake2b_256_hex(value.as_bytes());
            out.push_str(&truncate_hex(&digest, *n));
        }
        Expr::Shard(name, depth, width) => {
            let value = lookup(vars, name)?;
            let digest = blake2b_256_hex(value.as_bytes());
            let needed = depth * width;
            let hex = truncate_hex(&digest, needed);
            for (i, chunk) in hex.as_bytes().chunks(*width).enumerate() {
                if i > 0 {
                    out.push('/');
                }
                let _ = write!(out, "{}", std::str::from_utf8(chunk).unwrap_or(""));
            }
        }
    }
    Ok(())
}

/// A named, versioned pair of path templates: one for simulation results,
/// one for aggregation results.
#[derive(Debug, Clone)]
pub struct PathSchema {
    /// Schema name (`"bundle"` or `"token"`).
    pub name: &'static str,
    /// Schema version (`"v1"`).
    pub version: &'static str,
    /// Template for a simulation result's directory.
    pub sim_template: Template,
    /// Template for an aggregation result's directory.
    pub agg_template: Template,
}

impl PathSchema {
    /// `token/v1` — keys simulation results by a model token derived from
    /// bundle contents rather than the raw digest, so bundle edits that
    /// don't change model behaviour don't invalidate the cache. The
    /// default schema (spec.md §4.2).
    pub fn token_v1() -> Self {
        Self {
            name: "token",
            version: "v1",
            sim_template: Template::parse(
                "token/v1/sims/{bundle[:12]}/{param_id[:2]}/params_{param_id[:8]}/seed_{seed}",
            )
            .expect("built-in schema must parse"),
            agg_template: Template::parse("token/v1/aggs/{bundle[:12]}/target_{target}/agg_{agg_id}")
                .expect("built-in schema must parse"),
        }
    }

    /// `bundle/v1` — keys simulation results by the full bundle digest, so
    /// any bundle change invalidates cached results.
    pub fn bundle_v1() -> Self {
        Self {
            name: "bundle",
            version: "v1",
            sim_template: Template::parse(
                "bundle/v1/sims/{shard(bundle,2,2)}/{bundle}/{param_id[:2]}/params_{param_id[:8]}/seed_{seed}",
            )
            .expect("built-in schema must parse"),
            agg_template: Template::parse("bundle/v1/aggs/{bundle}/target_{target}/agg_{agg_id}")
                .expect("built-in schema must parse"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn var_and_truncate_render() {
        let t = Template::parse("{bundle[:6]}/full_{bundle}").unwrap();
        let rendered = t.render(&vars(&[("bundle", "abcdef0123456789")])).unwrap();
        assert_eq!(rendered, "abcdef/full_abcdef0123456789");
    }

    #[test]
    fn hash_construct_truncates_the_digest() {
        let t = Template::parse("{hash(x)[:8]}").unwrap();
        let rendered = t.render(&vars(&[("x", "hello")])).unwrap();
        assert_eq!(rendered.len(), 8);
        let again = t.render(&vars(&[("x", "hello")])).unwrap();
        assert_eq!(rendered, again);
    }

    #[test]
    fn shard_construct_splits_into_directory_components() {
        let t = Template::parse("{shard(x,2,2)}").unwrap();
        let rendered = t.render(&vars(&[("x", "anything")])).unwrap();
        let parts: Vec<&str> = rendered.split('/').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 2);
        assert_eq!(parts[1].len(), 2);
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        assert!(matches!(
            Template::parse("{bundle"),
            Err(SchemaError::UnbalancedBraces(_))
        ));
    }

    #[test]
    fn uppercase_variable_name_is_rejected() {
        assert!(matches!(
            Template::parse("{Bundle}"),
            Err(SchemaError::UppercaseVariable(_))
        ));
    }

    #[test]
    fn unknown_variable_fails_at_render_not_parse() {
        let t = Template::parse("{missing}").unwrap();
        let err = t.render(&HashMap::new()).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownVariable(name) if name == "missing"));
    }

    #[test]
    fn predefined_schemas_parse_and_render() {
        let token = PathSchema::token_v1();
        let rendered = token
            .sim_template
            .render(&vars(&[("bundle", &"a".repeat(64)), ("param_id", &"b".repeat(64)), ("seed", "7")]))
            .unwrap();
        assert!(rendered.starts_with("token/v1/sims/aaaaaaaaaaaa/bb/params_bbbbbbbb/seed_7"));

        let bundle = PathSchema::bundle_v1();
        let rendered = bundle
            .sim_template
            .render(&vars(&[("bundle", &"c".repeat(64)), ("param_id", &"d".repeat(64)), ("seed", "1")]))
            .unwrap();
        assert!(rendered.starts_with("bundle/v1/sims/"));
        assert!(rendered.contains(&"c".repeat(64)));
    }
}
