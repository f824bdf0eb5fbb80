//! Compiles date rules into SQL predicates over the `u` user alias.

use serde::{Deserialize, Serialize};

use crate::config::{validate_config, CompilerConfig};
use crate::error::RuleError;

use super::field::{identifier_pattern, DateField};
use super::operator::DateOperator;
use super::params::DateRuleParams;
use super::predicate::{CompiledPredicate, SqlBuilder};

/// A resolved rule: the field it targets and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRule {
    pub field: DateField,
    pub params: DateRuleParams,
}

#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    config: CompilerConfig,
}

impl SqlCompiler {
    pub fn new(config: CompilerConfig) -> Result<Self, RuleError> {
        validate_config(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile_rule(&self, rule: &DateRule, now: i64) -> Result<CompiledPredicate, RuleError> {
        self.compile(&rule.field, rule.params.operator, rule.params.date, now)
    }

    /// Build the predicate for `field <operator> value`, with `now` anchoring
    /// the duration operators.
    pub fn compile(
        &self,
        field: &DateField,
        operator: DateOperator,
        value: i64,
        now: i64,
    ) -> Result<CompiledPredicate, RuleError> {
        let comparison = operator.comparison(value, now)?;
        let cfg = &self.config;
        let mut b = SqlBuilder::new(cfg.bind_mode);

        match field {
            DateField::UserColumn(column) => {
                if !identifier_pattern().is_match(column) {
                    return Err(RuleError::InvalidColumn(column.clone()));
                }
                b.push(&format!("u.{} ", column)).push_comparison(comparison);
            }
            DateField::UserCustomField(field_id) => {
                b.push(&format!(
                    "EXISTS (SELECT 1 FROM {} usinda WHERE usinda.userid = u.id AND usinda.fieldid = ",
                    cfg.table("user_info_data")
                ))
                .push_int(*field_id)
                .push(&format!(" AND {} ", cfg.dialect.cast_char_to_int("usinda.data")))
                .push_comparison(comparison)
                .push(")");
            }
            DateField::PositionAssignmentDate => {
                b.push(&format!(
                    "EXISTS (SELECT 1 FROM {} ppa INNER JOIN {} p ON ppa.positionid = p.id \
                     WHERE ppa.userid = u.id AND ppa.type = ",
                    cfg.table("prog_pos_assignment"),
                    cfg.table("pos")
                ))
                .push_int(cfg.primary_assignment_type)
                .push(" AND ppa.timeassigned ")
                .push_comparison(comparison)
                .push(")");
            }
            DateField::PositionCustomField(field_id) => {
                push_assignment_custom_field(
                    &mut b,
                    cfg,
                    "pos_type_info_data",
                    "ptid",
                    "positionid",
                    *field_id,
                )
                .push_comparison(comparison)
                .push(")");
            }
            DateField::OrganisationCustomField(field_id) => {
                push_assignment_custom_field(
                    &mut b,
                    cfg,
                    "org_type_info_data",
                    "otid",
                    "organisationid",
                    *field_id,
                )
                .push_comparison(comparison)
                .push(")");
            }
        }

        let predicate = b.finish();
        log::debug!(
            "Compiled {:?} {} ({}): {}",
            field,
            operator.display_key(),
            value,
            predicate.sql
        );
        Ok(predicate)
    }
}

/// Opening of the EXISTS sub-query shared by position and organisation type
/// custom fields, up to and including the cast data column.
fn push_assignment_custom_field<'b>(
    b: &'b mut SqlBuilder,
    cfg: &CompilerConfig,
    data_table: &str,
    alias: &str,
    join_column: &str,
    field_id: i64,
) -> &'b mut SqlBuilder {
    b.push(&format!(
        "EXISTS (SELECT 1 FROM {pa_table} pa INNER JOIN {data_table} {a} \
         ON pa.{col} = {a}.{col} AND {a}.data <> '' AND {a}.data IS NOT NULL \
         WHERE pa.userid = u.id AND pa.type = ",
        pa_table = cfg.table("pos_assignment"),
        data_table = cfg.table(data_table),
        a = alias,
        col = join_column,
    ))
    .push_int(cfg.primary_assignment_type)
    .push(&format!(" AND {}.fieldid = ", alias))
    .push_int(field_id)
    .push(&format!(
        " AND {} ",
        cfg.dialect.cast_char_to_int(&format!("{}.data", alias))
    ))
}

/// Compile with the default configuration.
pub fn compile(
    field: &DateField,
    operator: DateOperator,
    value: i64,
    now: i64,
) -> Result<CompiledPredicate, RuleError> {
    SqlCompiler::default().compile(field, operator, value, now)
}
