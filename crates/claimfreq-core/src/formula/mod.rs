//! Formula parsing for R-style claim-frequency models.
//!
//! Parses formulas like `claims ~ C(region) * agecat + density + offset(log(exposure))`
//! into the response, the model terms, and the offset for design matrix
//! construction.

use std::collections::HashSet;

use crate::error::{ClaimFreqError, Result};

/// A model term: one variable (a main effect) or several (an interaction).
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub factors: Vec<String>,
}

impl Term {
    pub fn is_interaction(&self) -> bool {
        self.factors.len() > 1
    }

    /// `a:b` label used in logs and errors.
    pub fn label(&self) -> String {
        self.factors.join(":")
    }
}

/// `offset(var)` or `offset(log(var))`.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetTerm {
    pub variable: String,
    pub log: bool,
}

/// Result of parsing a formula.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFormula {
    pub response: String,
    /// Terms in model order: main effects first, then interactions by order.
    pub terms: Vec<Term>,
    /// Variables explicitly marked categorical with `C(...)`.
    pub categorical_vars: HashSet<String>,
    pub offset: Option<OffsetTerm>,
    pub has_intercept: bool,
}

impl ParsedFormula {
    /// Every variable referenced on the right-hand side, in first-use order.
    pub fn variables(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for term in &self.terms {
            for f in &term.factors {
                if !seen.contains(f) {
                    seen.push(f.clone());
                }
            }
        }
        seen
    }
}

/// Split formula RHS by '+', respecting parentheses.
fn split_terms(rhs: &str) -> Result<Vec<String>> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;

    for c in rhs.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ClaimFreqError::Formula(format!("unbalanced ')' in '{}'", rhs)));
                }
                current.push(c);
            }
            '+' if depth == 0 => {
                terms.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if depth != 0 {
        return Err(ClaimFreqError::Formula(format!("unbalanced '(' in '{}'", rhs)));
    }
    terms.push(current.trim().to_string());

    if terms.iter().any(|t| t.is_empty()) {
        return Err(ClaimFreqError::Formula(format!("empty term in '{}'", rhs)));
    }
    Ok(terms)
}

/// Strip a wrapping `name(` ... `)` call, returning the inner text.
fn strip_call<'a>(term: &'a str, name: &str) -> Option<&'a str> {
    let term = term.trim();
    let inner = term.strip_prefix(name)?.trim_start().strip_prefix('(')?;
    inner.strip_suffix(')').map(str::trim)
}

/// Clean variable name: "C(var)" -> "var"
fn clean_var_name(factor: &str) -> String {
    strip_call(factor, "C").unwrap_or(factor.trim()).to_string()
}

fn parse_offset(term: &str) -> Option<Result<OffsetTerm>> {
    let inner = strip_call(term, "offset")?;
    let (variable, log) = match strip_call(inner, "log") {
        Some(v) => (v.to_string(), true),
        None => (inner.to_string(), false),
    };
    if variable.is_empty() || !is_identifier(&variable) {
        return Some(Err(ClaimFreqError::Formula(format!(
            "offset must be offset(var) or offset(log(var)), got '{}'",
            term
        ))));
    }
    Some(Ok(OffsetTerm { variable, log }))
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// All subsets of size ≥ 2 of `factors`, by increasing size, keeping order.
fn interaction_subsets(factors: &[String]) -> Vec<Vec<String>> {
    let k = factors.len();
    let mut subsets: Vec<Vec<String>> = (1u32..(1 << k))
        .map(|mask| {
            (0..k)
                .filter(|&i| mask & (1 << i) != 0)
                .map(|i| factors[i].clone())
                .collect::<Vec<_>>()
        })
        .filter(|s| s.len() >= 2)
        .collect();
    subsets.sort_by_key(|s| s.len());
    subsets
}

/// Parse a formula string into structured components.
///
/// Handles:
/// - Main effects: `x1`, `C(region)`
/// - Interactions: `a:b` (interaction only), `a*b` (= `a + b + a:b`),
///   and higher order (`a*b*c` expands to every sub-interaction)
/// - Offset: `offset(log(exposure))` or `offset(logexp)`
/// - Intercept removal: `0 + ...`, `-1 + ...` or `... - 1`
pub fn parse_formula(formula: &str) -> Result<ParsedFormula> {
    let parts: Vec<&str> = formula.split('~').collect();
    if parts.len() != 2 {
        return Err(ClaimFreqError::Formula(format!(
            "formula must contain exactly one '~': {}",
            formula
        )));
    }

    let response = parts[0].trim().to_string();
    if !is_identifier(&response) {
        return Err(ClaimFreqError::Formula(format!("invalid response '{}'", response)));
    }
    let mut rhs = parts[1].trim().to_string();

    let mut has_intercept = true;
    for prefix in ["0 +", "0+", "- 1 +", "-1 +", "- 1+", "-1+"] {
        if let Some(rest) = rhs.strip_prefix(prefix) {
            has_intercept = false;
            rhs = rest.trim().to_string();
            break;
        }
    }
    for suffix in ["- 1", "-1"] {
        if let Some(rest) = rhs.strip_suffix(suffix) {
            has_intercept = false;
            rhs = rest.trim().trim_end_matches('+').trim().to_string();
            break;
        }
    }
    if rhs == "1" {
        rhs.clear();
    }

    let mut categorical_vars = HashSet::new();
    let mut main_effects: Vec<String> = Vec::new();
    let mut interactions: Vec<Vec<String>> = Vec::new();
    let mut offset = None;

    let raw_terms = if rhs.is_empty() { Vec::new() } else { split_terms(&rhs)? };

    for term in raw_terms {
        if term == "1" {
            continue;
        }
        if let Some(parsed) = parse_offset(&term) {
            if offset.is_some() {
                return Err(ClaimFreqError::Formula("only one offset term is allowed".to_string()));
            }
            offset = Some(parsed?);
            continue;
        }

        let (separator, full) = if term.contains('*') {
            ('*', true)
        } else if term.contains(':') {
            (':', false)
        } else {
            (' ', false)
        };

        let factor_strs: Vec<&str> = if separator == ' ' {
            vec![term.as_str()]
        } else {
            term.split(separator).collect()
        };

        let mut factors = Vec::with_capacity(factor_strs.len());
        for f in &factor_strs {
            let name = clean_var_name(f);
            if !is_identifier(&name) {
                return Err(ClaimFreqError::Formula(format!("unsupported term '{}'", term)));
            }
            if strip_call(f, "C").is_some() {
                categorical_vars.insert(name.clone());
            }
            factors.push(name);
        }

        if full {
            for f in &factors {
                if !main_effects.contains(f) {
                    main_effects.push(f.clone());
                }
            }
            for subset in interaction_subsets(&factors) {
                if !interactions.contains(&subset) {
                    interactions.push(subset);
                }
            }
        } else if factors.len() > 1 {
            if !interactions.contains(&factors) {
                interactions.push(factors);
            }
        } else if !main_effects.contains(&factors[0]) {
            main_effects.push(factors.remove(0));
        }
    }

    // R orders terms by interaction order
    interactions.sort_by_key(|f| f.len());

    let terms = main_effects
        .into_iter()
        .map(|f| Term { factors: vec![f] })
        .chain(interactions.into_iter().map(|factors| Term { factors }))
        .collect();

    Ok(ParsedFormula {
        response,
        terms,
        categorical_vars,
        offset,
        has_intercept,
    })
}
