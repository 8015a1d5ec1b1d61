//! Evaluation of compiled path expressions against `roxmltree` nodes.

use roxmltree::Node;
use crate::document::xpath::{Axis, BinaryOp, Expr, Expression, Function, NodeTest, Step, XPathError};
use crate::document::{document_order, Item, Namespaces};

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a, 'input> {
    Nodes(Vec<Item<'a, 'input>>),
    Text(String),
    Number(f64),
    Boolean(bool),
}

impl<'a, 'input> Value<'a, 'input> {
    pub fn to_text(&self) -> String {
        match self {
            Value::Nodes(items) => items.first().map(Item::string_value).unwrap_or_default(),
            Value::Text(text) => text.clone(),
            Value::Number(number) => format_number(*number),
            Value::Boolean(flag) => flag.to_string(),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(number) => *number,
            Value::Boolean(flag) => {
                if *flag {
                    1.0
                } else {
                    0.0
                }
            }
            other => parse_number(&other.to_text()),
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Value::Nodes(items) => !items.is_empty(),
            Value::Text(text) => !text.is_empty(),
            Value::Number(number) => *number != 0.0 && !number.is_nan(),
            Value::Boolean(flag) => *flag,
        }
    }

    fn into_nodes(self) -> Result<Vec<Item<'a, 'input>>, XPathError> {
        match self {
            Value::Nodes(items) => Ok(items),
            _ => Err(XPathError::NotNodeSet),
        }
    }

    fn atom(&self) -> Atom {
        match self {
            Value::Number(number) => Atom::Number(*number),
            Value::Boolean(flag) => Atom::Boolean(*flag),
            other => Atom::Text(other.to_text()),
        }
    }
}

fn parse_number(text: &str) -> f64 {
    text.trim().parse().unwrap_or(f64::NAN)
}

fn format_number(number: f64) -> String {
    if number.is_nan() {
        "NaN".to_string()
    } else if number.is_infinite() {
        let text = if number > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}

/// Scalar operand of a comparison.
#[derive(Debug, Clone, PartialEq)]
enum Atom {
    Text(String),
    Number(f64),
    Boolean(bool),
}

impl Atom {
    fn as_number(&self) -> f64 {
        match self {
            Atom::Text(text) => parse_number(text),
            Atom::Number(number) => *number,
            Atom::Boolean(flag) => {
                if *flag {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn as_bool(&self) -> bool {
        match self {
            Atom::Text(text) => !text.is_empty(),
            Atom::Number(number) => *number != 0.0 && !number.is_nan(),
            Atom::Boolean(flag) => *flag,
        }
    }

    fn compare(&self, op: BinaryOp, other: &Atom) -> bool {
        match op {
            BinaryOp::Eq | BinaryOp::NotEq => {
                let equal = match (self, other) {
                    (Atom::Boolean(_), _) | (_, Atom::Boolean(_)) => self.as_bool() == other.as_bool(),
                    (Atom::Number(_), _) | (_, Atom::Number(_)) => self.as_number() == other.as_number(),
                    (Atom::Text(a), Atom::Text(b)) => a == b,
                };
                if op == BinaryOp::Eq {
                    equal
                } else {
                    !equal
                }
            }
            BinaryOp::Lt => self.as_number() < other.as_number(),
            BinaryOp::Le => self.as_number() <= other.as_number(),
            BinaryOp::Gt => self.as_number() > other.as_number(),
            BinaryOp::Ge => self.as_number() >= other.as_number(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Context<'a, 'input> {
    item: Item<'a, 'input>,
    position: usize,
    size: usize,
}

/// Evaluates expressions with a fixed set of namespace bindings.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'ns> {
    namespaces: &'ns Namespaces,
}

impl<'ns> Evaluator<'ns> {
    pub fn new(namespaces: &'ns Namespaces) -> Self {
        Self { namespaces }
    }

    /// Select the items matched by `expression` relative to `context`.
    ///
    /// Fails with [`XPathError::NotNodeSet`] when the expression computes
    /// a scalar instead of selecting nodes.
    pub fn select<'a, 'input>(
        &self,
        expression: &Expression,
        context: Node<'a, 'input>,
    ) -> Result<Vec<Item<'a, 'input>>, XPathError> {
        self.evaluate(expression, context)?.into_nodes()
    }

    /// Evaluate `expression` and convert the result to a string.
    pub fn evaluate_string(&self, expression: &Expression, context: Node<'_, '_>) -> Result<String, XPathError> {
        Ok(self.evaluate(expression, context)?.to_text())
    }

    pub fn evaluate<'a, 'input>(
        &self,
        expression: &Expression,
        context: Node<'a, 'input>,
    ) -> Result<Value<'a, 'input>, XPathError> {
        let ast = expression.ast()?;
        let context = Context {
            item: Item::Node(context),
            position: 1,
            size: 1,
        };
        self.eval(ast, &context)
    }

    fn eval<'a, 'input>(&self, expr: &Expr, ctx: &Context<'a, 'input>) -> Result<Value<'a, 'input>, XPathError> {
        match expr {
            Expr::Literal(text) => Ok(Value::Text(text.clone())),
            Expr::Number(number) => Ok(Value::Number(*number)),
            Expr::Negate(operand) => Ok(Value::Number(-self.eval(operand, ctx)?.to_number())),
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right, ctx),
            Expr::Union(left, right) => {
                let mut items = self.eval(left, ctx)?.into_nodes()?;
                items.extend(self.eval(right, ctx)?.into_nodes()?);
                document_order(&mut items);
                Ok(Value::Nodes(items))
            }
            Expr::Path(path) => {
                let start = if path.absolute {
                    Item::Node(ctx.item.root())
                } else {
                    ctx.item
                };
                Ok(Value::Nodes(self.apply_steps(vec![start], &path.steps)?))
            }
            Expr::Filter { primary, predicates, steps } => {
                let mut items = self.eval(primary, ctx)?.into_nodes()?;
                document_order(&mut items);
                for predicate in predicates {
                    items = self.filter(items, predicate)?;
                }
                Ok(Value::Nodes(self.apply_steps(items, steps)?))
            }
            Expr::Function(function, args) => self.call(*function, args, ctx),
        }
    }

    fn eval_binary<'a, 'input>(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        ctx: &Context<'a, 'input>,
    ) -> Result<Value<'a, 'input>, XPathError> {
        match op {
            BinaryOp::Or => Ok(Value::Boolean(
                self.eval(left, ctx)?.to_bool() || self.eval(right, ctx)?.to_bool(),
            )),
            BinaryOp::And => Ok(Value::Boolean(
                self.eval(left, ctx)?.to_bool() && self.eval(right, ctx)?.to_bool(),
            )),
            BinaryOp::Add => Ok(Value::Number(
                self.eval(left, ctx)?.to_number() + self.eval(right, ctx)?.to_number(),
            )),
            BinaryOp::Sub => Ok(Value::Number(
                self.eval(left, ctx)?.to_number() - self.eval(right, ctx)?.to_number(),
            )),
            comparison => {
                let left = self.eval(left, ctx)?;
                let right = self.eval(right, ctx)?;
                Ok(Value::Boolean(compare(comparison, &left, &right)))
            }
        }
    }

    fn apply_steps<'a, 'input>(
        &self,
        mut items: Vec<Item<'a, 'input>>,
        steps: &[Step],
    ) -> Result<Vec<Item<'a, 'input>>, XPathError> {
        for step in steps {
            let mut next = Vec::new();
            for item in &items {
                let mut candidates = Vec::new();
                for candidate in axis_items(*item, step.axis) {
                    if self.matches(&candidate, &step.test, step.axis)? {
                        candidates.push(candidate);
                    }
                }
                for predicate in &step.predicates {
                    candidates = self.filter(candidates, predicate)?;
                }
                next.extend(candidates);
            }
            document_order(&mut next);
            items = next;
        }
        Ok(items)
    }

    fn filter<'a, 'input>(
        &self,
        items: Vec<Item<'a, 'input>>,
        predicate: &Expr,
    ) -> Result<Vec<Item<'a, 'input>>, XPathError> {
        let size = items.len();
        let mut kept = Vec::new();

        for (index, item) in items.into_iter().enumerate() {
            let ctx = Context {
                item,
                position: index + 1,
                size,
            };
            let keep = match self.eval(predicate, &ctx)? {
                Value::Number(number) => number == ctx.position as f64,
                other => other.to_bool(),
            };
            if keep {
                kept.push(item);
            }
        }

        Ok(kept)
    }

    fn resolve(&self, prefix: &str) -> Result<&'ns str, XPathError> {
        self.namespaces
            .resolve(prefix)
            .ok_or_else(|| XPathError::UnboundPrefix(prefix.to_string()))
    }

    fn matches(&self, item: &Item<'_, '_>, test: &NodeTest, axis: Axis) -> Result<bool, XPathError> {
        let attribute_axis = axis == Axis::Attribute;

        Ok(match test {
            NodeTest::Node => true,
            NodeTest::Text => item.node().map_or(false, |node| node.is_text()),
            NodeTest::Comment => item.node().map_or(false, |node| node.is_comment()),
            NodeTest::Any => principal_name(item, attribute_axis).is_some(),
            NodeTest::PrefixAny(prefix) => {
                let uri = self.resolve(prefix)?;
                matches!(principal_name(item, attribute_axis), Some((Some(ns), _)) if ns == uri)
            }
            NodeTest::Name { prefix, local } => {
                let uri = match prefix {
                    Some(prefix) => Some(self.resolve(prefix)?),
                    None => None,
                };
                match principal_name(item, attribute_axis) {
                    Some((ns, name)) => name == *local && ns.as_deref() == uri,
                    None => false,
                }
            }
        })
    }

    fn call<'a, 'input>(
        &self,
        function: Function,
        args: &[Expr],
        ctx: &Context<'a, 'input>,
    ) -> Result<Value<'a, 'input>, XPathError> {
        let text_arg = |index: usize| -> Result<String, XPathError> {
            match args.get(index) {
                Some(arg) => Ok(self.eval(arg, ctx)?.to_text()),
                None => Ok(ctx.item.string_value()),
            }
        };

        Ok(match function {
            Function::Last => Value::Number(ctx.size as f64),
            Function::Position => Value::Number(ctx.position as f64),
            Function::Count => Value::Number(self.eval(&args[0], ctx)?.into_nodes()?.len() as f64),
            Function::LocalName | Function::Name => {
                let target = match args.first() {
                    Some(arg) => self.eval(arg, ctx)?.into_nodes()?.into_iter().next(),
                    None => Some(ctx.item),
                };
                let name = match target.and_then(|item| principal_name(&item, item.attribute().is_some())) {
                    Some((ns, local)) if function == Function::Name => {
                        match ns.as_deref().and_then(|uri| self.namespaces.prefix_for(uri)) {
                            Some(prefix) => format!("{}:{}", prefix, local),
                            None => local,
                        }
                    }
                    Some((_, local)) => local,
                    None => String::new(),
                };
                Value::Text(name)
            }
            Function::String => Value::Text(text_arg(0)?),
            Function::Concat => {
                let mut joined = String::new();
                for arg in args {
                    joined.push_str(&self.eval(arg, ctx)?.to_text());
                }
                Value::Text(joined)
            }
            Function::StartsWith => Value::Boolean(text_arg(0)?.starts_with(&text_arg(1)?)),
            Function::Contains => Value::Boolean(text_arg(0)?.contains(&text_arg(1)?)),
            Function::SubstringBefore => {
                let haystack = text_arg(0)?;
                let needle = text_arg(1)?;
                Value::Text(
                    haystack
                        .find(&needle)
                        .map(|at| haystack[..at].to_string())
                        .unwrap_or_default(),
                )
            }
            Function::SubstringAfter => {
                let haystack = text_arg(0)?;
                let needle = text_arg(1)?;
                Value::Text(
                    haystack
                        .find(&needle)
                        .map(|at| haystack[at + needle.len()..].to_string())
                        .unwrap_or_default(),
                )
            }
            Function::StringLength => Value::Number(text_arg(0)?.chars().count() as f64),
            Function::NormalizeSpace => {
                Value::Text(text_arg(0)?.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            Function::Not => Value::Boolean(!self.eval(&args[0], ctx)?.to_bool()),
            Function::True => Value::Boolean(true),
            Function::False => Value::Boolean(false),
            Function::Boolean => Value::Boolean(self.eval(&args[0], ctx)?.to_bool()),
            Function::Number => match args.first() {
                Some(arg) => Value::Number(self.eval(arg, ctx)?.to_number()),
                None => Value::Number(parse_number(&ctx.item.string_value())),
            },
            Function::Sum => {
                let items = self.eval(&args[0], ctx)?.into_nodes()?;
                Value::Number(items.iter().map(|item| parse_number(&item.string_value())).sum())
            }
        })
    }
}

/// Namespace URI and local name of an item of the axis' principal type.
fn principal_name(item: &Item<'_, '_>, attribute_axis: bool) -> Option<(Option<String>, String)> {
    if attribute_axis {
        let attr = item.attribute()?;
        return Some((attr.namespace().map(str::to_string), attr.name().to_string()));
    }

    let node = item.node()?;
    if !node.is_element() {
        return None;
    }
    let tag = node.tag_name();
    Some((tag.namespace().map(str::to_string), tag.name().to_string()))
}

fn axis_items<'a, 'input>(item: Item<'a, 'input>, axis: Axis) -> Vec<Item<'a, 'input>> {
    let node = match item {
        Item::Node(node) => node,
        Item::Attribute { owner, .. } => {
            return match axis {
                Axis::SelfAxis => vec![item],
                Axis::Parent => vec![Item::Node(owner)],
                Axis::Ancestor => owner.ancestors().map(Item::Node).collect(),
                Axis::AncestorOrSelf => {
                    let mut items = vec![item];
                    items.extend(owner.ancestors().map(Item::Node));
                    items
                }
                _ => Vec::new(),
            };
        }
    };

    match axis {
        Axis::Child => node.children().map(Item::Node).collect(),
        Axis::Descendant => node.descendants().skip(1).map(Item::Node).collect(),
        Axis::DescendantOrSelf => node.descendants().map(Item::Node).collect(),
        Axis::SelfAxis => vec![item],
        Axis::Parent => node.parent().map(Item::Node).into_iter().collect(),
        Axis::Ancestor => node.ancestors().skip(1).map(Item::Node).collect(),
        Axis::AncestorOrSelf => node.ancestors().map(Item::Node).collect(),
        Axis::Attribute => {
            if !node.is_element() {
                return Vec::new();
            }
            node.attributes()
                .enumerate()
                .map(|(index, _)| Item::Attribute { owner: node, index })
                .collect()
        }
        Axis::FollowingSibling => {
            let mut items = Vec::new();
            let mut sibling = node.next_sibling();
            while let Some(next) = sibling {
                items.push(Item::Node(next));
                sibling = next.next_sibling();
            }
            items
        }
        Axis::PrecedingSibling => {
            let mut items = Vec::new();
            let mut sibling = node.prev_sibling();
            while let Some(prev) = sibling {
                items.push(Item::Node(prev));
                sibling = prev.prev_sibling();
            }
            items
        }
    }
}

fn compare(op: BinaryOp, left: &Value<'_, '_>, right: &Value<'_, '_>) -> bool {
    match (left, right) {
        (Value::Nodes(lhs), Value::Nodes(rhs)) => lhs.iter().any(|a| {
            let a = Atom::Text(a.string_value());
            rhs.iter().any(|b| a.compare(op, &Atom::Text(b.string_value())))
        }),
        (Value::Nodes(nodes), scalar) => match scalar.atom() {
            Atom::Boolean(flag) => Atom::Boolean(!nodes.is_empty()).compare(op, &Atom::Boolean(flag)),
            atom => nodes
                .iter()
                .any(|node| Atom::Text(node.string_value()).compare(op, &atom)),
        },
        (scalar, Value::Nodes(nodes)) => match scalar.atom() {
            Atom::Boolean(flag) => Atom::Boolean(flag).compare(op, &Atom::Boolean(!nodes.is_empty())),
            atom => nodes
                .iter()
                .any(|node| atom.compare(op, &Atom::Text(node.string_value()))),
        },
        _ => left.atom().compare(op, &right.atom()),
    }
}
