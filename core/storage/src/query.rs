//! Filter-expression builder for the Drive `q` parameter.

/// Clause excluding trashed objects.
pub const NOT_TRASHED: &str = "trashed = false";

/// Escape a value for use inside a single-quoted query literal.
///
/// Backslashes are escaped first so that a trailing backslash in the input
/// cannot neutralize the escape added in front of a quote.
pub fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Composes filter clauses into a single expression.
///
/// Each clause is parenthesized and clauses are joined with `and`. Adding
/// the same clause twice keeps one copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryBuilder {
    clauses: Vec<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude trashed objects.
    pub fn exclude_trashed(self) -> Self {
        self.clause(NOT_TRASHED)
    }

    /// Add a caller-supplied predicate verbatim. Blank predicates are ignored.
    pub fn predicate(self, predicate: &str) -> Self {
        let predicate = predicate.trim();
        if predicate.is_empty() {
            return self;
        }
        self.clause(predicate)
    }

    /// Restrict to objects contained in `folder_id`.
    pub fn in_parents(self, folder_id: &str) -> Self {
        let clause = format!("'{}' in parents", escape_literal(folder_id));
        self.clause(&clause)
    }

    fn clause(mut self, clause: &str) -> Self {
        let clause = format!("({})", clause);
        if !self.clauses.contains(&clause) {
            self.clauses.push(clause);
        }
        self
    }

    /// Number of active clauses.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render the expression, or `None` when no clause is active.
    pub fn build(&self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            Some(self.clauses.join(" and "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_builder_has_no_expression() {
        assert_eq!(QueryBuilder::new().build(), None);
    }

    #[test]
    fn test_single_clause_is_parenthesized() {
        let q = QueryBuilder::new().exclude_trashed().build();
        assert_eq!(q.as_deref(), Some("(trashed = false)"));
    }

    #[test]
    fn test_clauses_joined_in_insertion_order() {
        let q = QueryBuilder::new()
            .exclude_trashed()
            .predicate("mimeType = 'application/pdf'")
            .in_parents("folder1")
            .build()
            .unwrap();

        assert_eq!(
            q,
            "(trashed = false) and (mimeType = 'application/pdf') and ('folder1' in parents)"
        );
    }

    #[test]
    fn test_duplicate_clause_kept_once() {
        let builder = QueryBuilder::new().exclude_trashed().exclude_trashed();
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_blank_predicate_ignored() {
        let builder = QueryBuilder::new().predicate("   ");
        assert!(builder.is_empty());
    }

    #[test]
    fn test_folder_quote_escaped() {
        let q = QueryBuilder::new().in_parents("it's").build().unwrap();
        assert_eq!(q, r"('it\'s' in parents)");
    }

    #[test]
    fn test_backslash_cannot_unescape_quote() {
        assert_eq!(escape_literal(r"a\'b"), r"a\\\'b");
    }

    /// Returns the number of quotes in `segment` not preceded by an odd run of backslashes.
    fn unescaped_quotes(segment: &str) -> usize {
        let mut count = 0;
        let mut backslashes = 0;
        for c in segment.chars() {
            match c {
                '\\' => backslashes += 1,
                '\'' => {
                    if backslashes % 2 == 0 {
                        count += 1;
                    }
                    backslashes = 0;
                }
                _ => backslashes = 0,
            }
        }
        count
    }

    proptest! {
        #[test]
        fn prop_escaped_identifier_has_no_bare_quote(id in "[a-zA-Z0-9'\\\\ ]{0,32}") {
            prop_assert_eq!(unescaped_quotes(&escape_literal(&id)), 0);
        }

        #[test]
        fn prop_folder_clause_is_well_delimited(id in ".{0,32}") {
            let q = QueryBuilder::new().in_parents(&id).build().unwrap();
            // Only the two delimiting quotes remain unescaped.
            prop_assert_eq!(unescaped_quotes(&q), 2);
            prop_assert!(q.ends_with("' in parents)"), "unexpected expression: {}", q);
        }

        #[test]
        fn prop_trashed_clause_present_once(
            predicate in "[a-z]{1,8} = '[a-z]{0,8}'",
            folder in "[a-z']{1,8}",
        ) {
            let q = QueryBuilder::new()
                .exclude_trashed()
                .predicate(&predicate)
                .in_parents(&folder)
                .exclude_trashed()
                .build()
                .unwrap();
            prop_assert_eq!(q.matches(NOT_TRASHED).count(), 1);
        }
    }
}
