//! Cell value extraction.
//!
//! Resolves one cell's text from a document node with a column's path
//! expression. Extraction never fails a row: problems are logged and the
//! cell is left empty.

use roxmltree::Node;
use crate::document::{Evaluator, Expression, Item, Namespaces};
use crate::mapping::Column;
use crate::report::{Diagnostic, DiagnosticKind, RunLog};

/// Separator between the values of several matched nodes.
pub const MATCH_SEPARATOR: &str = "\n";

/// Separator between the text leaves of one narrative node.
pub const NARRATIVE_SEPARATOR: &str = " ";

/// Attributes consulted, in order, when a matched element has no value of
/// its own.
const VALUE_ATTRIBUTES: [&str; 3] = ["value", "displayName", "code"];

/// Resolves cell values with a run's namespace bindings.
#[derive(Debug, Clone, Copy)]
pub struct Extractor<'ns> {
    evaluator: Evaluator<'ns>,
}

impl<'ns> Extractor<'ns> {
    pub fn new(namespaces: &'ns Namespaces) -> Self {
        Self {
            evaluator: Evaluator::new(namespaces),
        }
    }

    pub fn evaluator(&self) -> &Evaluator<'ns> {
        &self.evaluator
    }

    /// Resolve a configured column against `context`.
    pub fn resolve_column(&self, column: &Column, context: Node<'_, '_>, log: &mut RunLog) -> Option<String> {
        self.resolve(column.expression(), context, column.is_narrative(), log)
    }

    /// Resolve `expression` against `context`.
    ///
    /// # Returns
    /// * `None` - the expression is empty, or could not be evaluated at all
    /// * `Some("")` - the expression matched nothing
    /// * `Some(text)` - the values of all matched nodes, one per line
    pub fn resolve(
        &self,
        expression: &Expression,
        context: Node<'_, '_>,
        narrative: bool,
        log: &mut RunLog,
    ) -> Option<String> {
        if expression.is_empty() {
            return None;
        }

        let items = match self.evaluator.select(expression, context) {
            Ok(items) => items,
            Err(select_error) => {
                return match self.evaluator.evaluate_string(expression, context) {
                    Ok(text) => Some(text),
                    Err(error) => {
                        tracing::debug!(%expression, %select_error, "Scalar fallback failed");
                        log.push(Diagnostic::warning(
                            DiagnosticKind::Extraction,
                            format!("Error evaluating expression \"{}\": {}", expression, error),
                        ));
                        None
                    }
                };
            }
        };

        let values: Vec<String> = items
            .iter()
            .map(|item| {
                if narrative {
                    narrative_text(item)
                } else {
                    scalar_value(item)
                }
            })
            .filter(|value| !value.is_empty())
            .collect();

        Some(values.join(MATCH_SEPARATOR))
    }
}

/// All non-blank descendant text of one node, space separated.
fn narrative_text(item: &Item<'_, '_>) -> String {
    item.text_leaves().join(NARRATIVE_SEPARATOR)
}

/// First non-empty of: own value, `value`, `displayName`, `code`, full text.
fn scalar_value(item: &Item<'_, '_>) -> String {
    item.own_value()
        .filter(|value| !value.is_empty())
        .or_else(|| {
            VALUE_ATTRIBUTES
                .iter()
                .filter_map(|name| item.attribute_value(name))
                .find(|value| !value.is_empty())
        })
        .unwrap_or_else(|| item.string_value())
}
