//! Combines compiled predicates: AND within a rule set, OR across rule sets.

use super::predicate::CompiledPredicate;

/// Fold rule sets into one parenthesised predicate.
///
/// No rule sets, or a rule set without rules, never matches anyone: an
/// audience is never widened to every user by missing configuration.
pub fn aggregate(rule_sets: Vec<Vec<CompiledPredicate>>) -> CompiledPredicate {
    if rule_sets.is_empty() {
        let nothing = CompiledPredicate::match_nothing();
        return CompiledPredicate {
            sql: format!("({})", nothing.sql),
            params: nothing.params,
        };
    }

    let mut params = Vec::new();
    let mut groups = Vec::with_capacity(rule_sets.len());

    for rule_set in rule_sets {
        if rule_set.is_empty() {
            groups.push(format!("({})", CompiledPredicate::match_nothing().sql));
            continue;
        }
        let mut terms = Vec::with_capacity(rule_set.len());
        for predicate in rule_set {
            terms.push(predicate.sql);
            params.extend(predicate.params);
        }
        groups.push(format!("({})", terms.join(" AND ")));
    }

    CompiledPredicate {
        sql: format!("({})", groups.join(" OR ")),
        params,
    }
}
