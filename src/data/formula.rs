//! Model definition parsing.
//!
//! Grammar (whitespace is ignored):
//!
//! ```text
//! formula := response '~' rhs
//! rhs     := ['-'] term (('+' | '-') term)*
//! term    := '0' | '1' | field (':' field)*
//! ```
//!
//! `- 1` or `+ 0` removes the intercept. `a:b` is the interaction of the
//! fields `a` and `b`. Only the intercept can be subtracted.

use crate::core::ConfigurationError;

/// A main effect (one field) or an interaction (several fields).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub fields: Vec<String>,
}

impl Term {
    pub fn is_interaction(&self) -> bool {
        self.fields.len() > 1
    }

    /// Display name, fields joined by ':'.
    pub fn name(&self) -> String {
        self.fields.join(":")
    }
}

/// A parsed model definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFormula {
    pub response: String,
    pub terms: Vec<Term>,
    pub intercept: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Plus,
    Minus,
    Colon,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn malformed(formula: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::MalformedFormula {
        formula: formula.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(formula: &str, rhs: &str) -> Result<Vec<Token>, ConfigurationError> {
    let mut tokens = Vec::new();
    let mut chars = rhs.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            c if is_ident_char(c) => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_ident_char(c) {
                        break;
                    }
                    ident.push(c);
                    chars.next();
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(malformed(formula, format!("unexpected character '{}'", other))),
        }
    }
    Ok(tokens)
}

impl ModelFormula {
    /// Parse a formula such as `"y ~ x1 + x2:x3 + essence"`.
    pub fn parse(formula: &str) -> Result<Self, ConfigurationError> {
        let mut sides = formula.split('~');
        let (lhs, rhs) = match (sides.next(), sides.next(), sides.next()) {
            (Some(lhs), Some(rhs), None) => (lhs.trim(), rhs.trim()),
            _ => return Err(malformed(formula, "expected exactly one '~'")),
        };
        if lhs.is_empty() || !lhs.chars().all(is_ident_char) {
            return Err(malformed(formula, "response must be a single field name"));
        }
        if rhs.is_empty() {
            return Err(malformed(formula, "no terms on the right-hand side"));
        }

        let tokens = tokenize(formula, rhs)?;
        let mut intercept = true;
        let mut terms: Vec<Term> = Vec::new();
        let mut pos = 0;
        let mut negate = false;

        if tokens.first() == Some(&Token::Minus) {
            negate = true;
            pos = 1;
        }

        loop {
            // A term: ident (':' ident)*
            let mut fields = Vec::new();
            loop {
                match tokens.get(pos) {
                    Some(Token::Ident(name)) => fields.push(name.clone()),
                    _ => return Err(malformed(formula, "expected a field name")),
                }
                pos += 1;
                if tokens.get(pos) == Some(&Token::Colon) {
                    pos += 1;
                } else {
                    break;
                }
            }

            let is_constant = fields.len() == 1 && (fields[0] == "0" || fields[0] == "1");
            if is_constant {
                let keep = (fields[0] == "1") != negate;
                intercept = keep;
            } else if negate {
                return Err(malformed(formula, "only the intercept can be removed"));
            } else {
                if fields.iter().any(|f| f.chars().all(|c| c.is_ascii_digit() || c == '.')) {
                    return Err(malformed(formula, "numeric constants cannot enter interactions"));
                }
                let term = Term { fields };
                if !terms.contains(&term) {
                    terms.push(term);
                }
            }

            match tokens.get(pos) {
                None => break,
                Some(Token::Plus) => negate = false,
                Some(Token::Minus) => negate = true,
                Some(_) => return Err(malformed(formula, "expected '+' or '-' between terms")),
            }
            pos += 1;
        }

        Ok(Self {
            response: lhs.to_string(),
            terms,
            intercept,
        })
    }

    /// Every field referenced by the formula, response first, without duplicates.
    pub fn fields(&self) -> Vec<String> {
        let mut out = vec![self.response.clone()];
        for term in &self.terms {
            for f in &term.fields {
                if !out.contains(f) {
                    out.push(f.clone());
                }
            }
        }
        out
    }
}

/// Parse an additive list of field names such as `"x + y"`.
pub fn parse_field_list(expression: &str) -> Result<Vec<String>, ConfigurationError> {
    let fields: Vec<String> = expression.split('+').map(|s| s.trim().to_string()).collect();
    if fields.iter().any(|f| f.is_empty() || !f.chars().all(is_ident_char)) {
        return Err(malformed(expression, "expected field names separated by '+'"));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_main_effects_and_interactions() {
        let f = ModelFormula::parse("y ~ x1 + x2:x3 + essence").unwrap();
        assert_eq!(f.response, "y");
        assert!(f.intercept);
        assert_eq!(f.terms.len(), 3);
        assert!(!f.terms[0].is_interaction());
        assert_eq!(f.terms[1].fields, vec!["x2", "x3"]);
        assert_eq!(f.terms[1].name(), "x2:x3");
        assert_eq!(f.fields(), vec!["y", "x1", "x2", "x3", "essence"]);
    }

    #[test]
    fn test_remove_intercept() {
        let f = ModelFormula::parse("y ~ x - 1").unwrap();
        assert!(!f.intercept);
        let f = ModelFormula::parse("y ~ -1 + x").unwrap();
        assert!(!f.intercept);
        let f = ModelFormula::parse("y ~ 0 + x").unwrap();
        assert!(!f.intercept);
        let f = ModelFormula::parse("y ~ 1").unwrap();
        assert!(f.intercept);
        assert!(f.terms.is_empty());
    }

    #[test]
    fn test_duplicate_terms_collapsed() {
        let f = ModelFormula::parse("y ~ x + x").unwrap();
        assert_eq!(f.terms.len(), 1);
    }

    #[test]
    fn test_malformed_formulas() {
        for bad in [
            "y x",
            "~ x",
            "y ~",
            "y ~ x +",
            "y ~ x ++ z",
            "y ~ x - z",
            "y ~ x * z",
            "y ~ x:",
            "a ~ b ~ c",
            "y z ~ x",
        ] {
            assert!(
                matches!(
                    ModelFormula::parse(bad),
                    Err(ConfigurationError::MalformedFormula { .. })
                ),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_parse_field_list() {
        assert_eq!(parse_field_list("x + y").unwrap(), vec!["x", "y"]);
        assert!(parse_field_list("x + ").is_err());
    }
}
