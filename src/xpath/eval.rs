//! XPath evaluation against a [`Document`]

use scraper::Node;

use super::parser::{ArithOp, Axis, CmpOp, Expr, Function, LocationPath, NodeTest, Step};
use super::{Document, DomNode};

/// Intermediate XPath value
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Object {
    Nodes(Vec<DomNode>),
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl Object {
    pub(crate) fn into_boolean(self) -> bool {
        match self {
            Object::Nodes(nodes) => !nodes.is_empty(),
            Object::Boolean(b) => b,
            Object::Number(n) => n != 0.0 && !n.is_nan(),
            Object::Text(s) => !s.is_empty(),
        }
    }

    pub(crate) fn into_string(self, doc: &Document) -> String {
        match self {
            Object::Nodes(nodes) => nodes
                .first()
                .map(|n| doc.string_value(*n))
                .unwrap_or_default(),
            Object::Boolean(b) => b.to_string(),
            Object::Number(n) => number_to_string(n),
            Object::Text(s) => s,
        }
    }

    fn into_number(self, doc: &Document) -> f64 {
        match self {
            Object::Boolean(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Object::Number(n) => n,
            other => string_to_number(&other.into_string(doc)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Context {
    node: DomNode,
    position: usize,
    size: usize,
}

impl Context {
    pub(crate) fn single(node: DomNode) -> Self {
        Self {
            node,
            position: 1,
            size: 1,
        }
    }
}

pub(crate) fn evaluate(doc: &Document, expr: &Expr, ctx: &Context) -> Object {
    match expr {
        Expr::Or(left, right) => Object::Boolean(
            evaluate(doc, left, ctx).into_boolean() || evaluate(doc, right, ctx).into_boolean(),
        ),
        Expr::And(left, right) => Object::Boolean(
            evaluate(doc, left, ctx).into_boolean() && evaluate(doc, right, ctx).into_boolean(),
        ),
        Expr::Compare(op, left, right) => {
            let left = evaluate(doc, left, ctx);
            let right = evaluate(doc, right, ctx);
            Object::Boolean(compare(doc, *op, left, right))
        }
        Expr::Arith(op, left, right) => {
            let a = evaluate(doc, left, ctx).into_number(doc);
            let b = evaluate(doc, right, ctx).into_number(doc);
            Object::Number(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Mod => a % b,
            })
        }
        Expr::Neg(inner) => Object::Number(-evaluate(doc, inner, ctx).into_number(doc)),
        Expr::Union(left, right) => {
            match (evaluate(doc, left, ctx), evaluate(doc, right, ctx)) {
                (Object::Nodes(mut a), Object::Nodes(b)) => {
                    a.extend(b);
                    doc.sort_nodes(&mut a);
                    Object::Nodes(a)
                }
                _ => Object::Nodes(Vec::new()),
            }
        }
        Expr::Path(path) => Object::Nodes(eval_path(doc, path, ctx)),
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            let Object::Nodes(mut nodes) = evaluate(doc, primary, ctx) else {
                return Object::Nodes(Vec::new());
            };
            for predicate in predicates {
                nodes = filter(doc, nodes, predicate);
            }
            for step in steps {
                nodes = eval_step(doc, &nodes, step);
            }
            Object::Nodes(nodes)
        }
        Expr::Literal(s) => Object::Text(s.clone()),
        Expr::Number(n) => Object::Number(*n),
        Expr::Call(function, args) => call(doc, *function, args, ctx),
    }
}

fn eval_path(doc: &Document, path: &LocationPath, ctx: &Context) -> Vec<DomNode> {
    let mut nodes = if path.absolute {
        vec![doc.root()]
    } else {
        vec![ctx.node]
    };
    for step in &path.steps {
        nodes = eval_step(doc, &nodes, step);
        if nodes.is_empty() {
            break;
        }
    }
    nodes
}

fn eval_step(doc: &Document, context: &[DomNode], step: &Step) -> Vec<DomNode> {
    let mut result = Vec::new();
    for node in context {
        let mut selected: Vec<DomNode> = axis_nodes(doc, *node, step.axis)
            .into_iter()
            .filter(|n| node_test(doc, *n, step))
            .collect();
        doc.sort_nodes(&mut selected);
        if step.axis.is_reverse() {
            selected.reverse();
        }
        for predicate in &step.predicates {
            selected = filter(doc, selected, predicate);
        }
        result.extend(selected);
    }
    doc.sort_nodes(&mut result);
    result
}

/// Apply one predicate, keeping the incoming order for proximity positions
fn filter(doc: &Document, nodes: Vec<DomNode>, predicate: &Expr) -> Vec<DomNode> {
    let size = nodes.len();
    nodes
        .into_iter()
        .enumerate()
        .filter(|(i, node)| {
            let ctx = Context {
                node: *node,
                position: i + 1,
                size,
            };
            match evaluate(doc, predicate, &ctx) {
                Object::Number(n) => n == (i + 1) as f64,
                other => other.into_boolean(),
            }
        })
        .map(|(_, node)| node)
        .collect()
}

fn axis_nodes(doc: &Document, node: DomNode, axis: Axis) -> Vec<DomNode> {
    let tree_node = |id| doc.get(id);
    match (axis, node) {
        (Axis::SelfAxis, _) => vec![node],
        (Axis::Attribute, DomNode::Node(id)) => {
            let count = tree_node(id)
                .and_then(|n| n.value().as_element().map(|e| e.attrs().count()))
                .unwrap_or(0);
            (0..count).map(|i| DomNode::Attr(id, i)).collect()
        }
        (Axis::Attribute, DomNode::Attr(..)) => Vec::new(),
        (Axis::Child, DomNode::Node(id)) => tree_node(id)
            .map(|n| n.children().map(|c| DomNode::Node(c.id())).collect())
            .unwrap_or_default(),
        (Axis::Descendant, DomNode::Node(id)) => tree_node(id)
            .map(|n| n.descendants().skip(1).map(|c| DomNode::Node(c.id())).collect())
            .unwrap_or_default(),
        (Axis::DescendantOrSelf, DomNode::Node(id)) => tree_node(id)
            .map(|n| n.descendants().map(|c| DomNode::Node(c.id())).collect())
            .unwrap_or_default(),
        (Axis::Child | Axis::Descendant, DomNode::Attr(..)) => Vec::new(),
        (Axis::DescendantOrSelf, DomNode::Attr(..)) => vec![node],
        (Axis::Parent, DomNode::Node(id)) => tree_node(id)
            .and_then(|n| n.parent())
            .map(|p| vec![DomNode::Node(p.id())])
            .unwrap_or_default(),
        (Axis::Parent, DomNode::Attr(owner, _)) => vec![DomNode::Node(owner)],
        (Axis::Ancestor | Axis::AncestorOrSelf, _) => {
            let mut out = Vec::new();
            if axis == Axis::AncestorOrSelf {
                out.push(node);
            }
            let start = match node {
                DomNode::Node(id) => tree_node(id).and_then(|n| n.parent()),
                DomNode::Attr(owner, _) => tree_node(owner),
            };
            if let Some(start) = start {
                out.push(DomNode::Node(start.id()));
                out.extend(start.ancestors().map(|a| DomNode::Node(a.id())));
            }
            out
        }
        (Axis::FollowingSibling, DomNode::Node(id)) => tree_node(id)
            .map(|n| n.next_siblings().map(|s| DomNode::Node(s.id())).collect())
            .unwrap_or_default(),
        (Axis::PrecedingSibling, DomNode::Node(id)) => tree_node(id)
            .map(|n| n.prev_siblings().map(|s| DomNode::Node(s.id())).collect())
            .unwrap_or_default(),
        (Axis::FollowingSibling | Axis::PrecedingSibling, DomNode::Attr(..)) => Vec::new(),
        (Axis::Following, _) => {
            let mut out = Vec::new();
            let start = match node {
                DomNode::Node(id) => tree_node(id),
                DomNode::Attr(owner, _) => {
                    // An attribute precedes its owner's content
                    let owner = tree_node(owner);
                    if let Some(owner) = owner {
                        out.extend(owner.descendants().skip(1).map(|d| DomNode::Node(d.id())));
                    }
                    owner
                }
            };
            let mut current = start;
            while let Some(cur) = current {
                for sibling in cur.next_siblings() {
                    out.extend(sibling.descendants().map(|d| DomNode::Node(d.id())));
                }
                current = cur.parent();
            }
            out
        }
        (Axis::Preceding, _) => {
            let mut out = Vec::new();
            let start = match node {
                DomNode::Node(id) => tree_node(id),
                DomNode::Attr(owner, _) => tree_node(owner),
            };
            let mut current = start;
            while let Some(cur) = current {
                for sibling in cur.prev_siblings() {
                    out.extend(sibling.descendants().map(|d| DomNode::Node(d.id())));
                }
                current = cur.parent();
            }
            out
        }
    }
}

fn node_test(doc: &Document, node: DomNode, step: &Step) -> bool {
    match node {
        DomNode::Attr(id, index) => {
            // Attributes only surface on the attribute axis (or via self/parent of one)
            match &step.test {
                NodeTest::Any | NodeTest::Node => true,
                NodeTest::Name(name) => doc
                    .attribute(id, index)
                    .is_some_and(|(attr, _)| attr.eq_ignore_ascii_case(name)),
                NodeTest::Text | NodeTest::Comment => false,
            }
        }
        DomNode::Node(id) => {
            if step.axis == Axis::Attribute {
                return false;
            }
            let Some(tree_node) = doc.get(id) else {
                return false;
            };
            match (&step.test, tree_node.value()) {
                (NodeTest::Node, _) => true,
                (NodeTest::Any, Node::Element(_)) => true,
                (NodeTest::Name(name), Node::Element(element)) => {
                    element.name().eq_ignore_ascii_case(name)
                }
                (NodeTest::Text, Node::Text(_)) => true,
                (NodeTest::Comment, Node::Comment(_)) => true,
                _ => false,
            }
        }
    }
}

fn compare(doc: &Document, op: CmpOp, left: Object, right: Object) -> bool {
    match (left, right) {
        (Object::Nodes(a), Object::Nodes(b)) => {
            let b: Vec<String> = b.iter().map(|n| doc.string_value(*n)).collect();
            a.iter().any(|n| {
                let a = Object::Text(doc.string_value(*n));
                b.iter()
                    .any(|b| compare_atoms(doc, op, a.clone(), Object::Text(b.clone())))
            })
        }
        (Object::Nodes(nodes), Object::Boolean(b)) => {
            compare_atoms(doc, op, Object::Boolean(!nodes.is_empty()), Object::Boolean(b))
        }
        (Object::Boolean(b), Object::Nodes(nodes)) => {
            compare_atoms(doc, op, Object::Boolean(b), Object::Boolean(!nodes.is_empty()))
        }
        (Object::Nodes(nodes), other) => nodes.iter().any(|n| {
            compare_atoms(doc, op, Object::Text(doc.string_value(*n)), other.clone())
        }),
        (other, Object::Nodes(nodes)) => nodes.iter().any(|n| {
            compare_atoms(doc, op, other.clone(), Object::Text(doc.string_value(*n)))
        }),
        (a, b) => compare_atoms(doc, op, a, b),
    }
}

fn compare_atoms(doc: &Document, op: CmpOp, a: Object, b: Object) -> bool {
    match op {
        CmpOp::Eq | CmpOp::Neq => {
            let any_boolean =
                matches!(a, Object::Boolean(_)) || matches!(b, Object::Boolean(_));
            let any_number = matches!(a, Object::Number(_)) || matches!(b, Object::Number(_));
            let equal = if any_boolean {
                a.into_boolean() == b.into_boolean()
            } else if any_number {
                a.into_number(doc) == b.into_number(doc)
            } else {
                a.into_string(doc) == b.into_string(doc)
            };
            (op == CmpOp::Eq) == equal
        }
        CmpOp::Lt => a.into_number(doc) < b.into_number(doc),
        CmpOp::Le => a.into_number(doc) <= b.into_number(doc),
        CmpOp::Gt => a.into_number(doc) > b.into_number(doc),
        CmpOp::Ge => a.into_number(doc) >= b.into_number(doc),
    }
}

fn call(doc: &Document, function: Function, args: &[Expr], ctx: &Context) -> Object {
    let arg = |i: usize| evaluate(doc, &args[i], ctx);
    let string_arg = |i: usize| {
        if args.len() > i {
            arg(i).into_string(doc)
        } else {
            doc.string_value(ctx.node)
        }
    };
    let nodes_arg = |i: usize| match args.get(i).map(|a| evaluate(doc, a, ctx)) {
        Some(Object::Nodes(nodes)) => nodes,
        Some(_) => Vec::new(),
        None => vec![ctx.node],
    };

    match function {
        Function::Last => Object::Number(ctx.size as f64),
        Function::Position => Object::Number(ctx.position as f64),
        Function::Count => Object::Number(nodes_arg(0).len() as f64),
        Function::Not => Object::Boolean(!arg(0).into_boolean()),
        Function::True => Object::Boolean(true),
        Function::False => Object::Boolean(false),
        Function::Boolean => Object::Boolean(arg(0).into_boolean()),
        Function::String => Object::Text(string_arg(0)),
        Function::Number => Object::Number(if args.is_empty() {
            string_to_number(&doc.string_value(ctx.node))
        } else {
            arg(0).into_number(doc)
        }),
        Function::Concat => Object::Text(
            (0..args.len())
                .map(|i| arg(i).into_string(doc))
                .collect::<String>(),
        ),
        Function::Contains => Object::Boolean(string_arg(0).contains(&string_arg(1))),
        Function::StartsWith => Object::Boolean(string_arg(0).starts_with(&string_arg(1))),
        Function::EndsWith => Object::Boolean(string_arg(0).ends_with(&string_arg(1))),
        Function::NormalizeSpace => Object::Text(
            string_arg(0)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Function::StringLength => Object::Number(string_arg(0).chars().count() as f64),
        Function::Substring => {
            let s = string_arg(0);
            let start = xpath_round(arg(1).into_number(doc));
            let end = if args.len() > 2 {
                start + xpath_round(arg(2).into_number(doc))
            } else {
                f64::INFINITY
            };
            Object::Text(
                s.chars()
                    .enumerate()
                    .filter(|(i, _)| {
                        let p = (i + 1) as f64;
                        p >= start && p < end
                    })
                    .map(|(_, c)| c)
                    .collect(),
            )
        }
        Function::SubstringBefore => {
            let s = string_arg(0);
            let needle = string_arg(1);
            Object::Text(
                s.find(&needle)
                    .map(|i| s[..i].to_string())
                    .unwrap_or_default(),
            )
        }
        Function::SubstringAfter => {
            let s = string_arg(0);
            let needle = string_arg(1);
            Object::Text(
                s.find(&needle)
                    .map(|i| s[i + needle.len()..].to_string())
                    .unwrap_or_default(),
            )
        }
        Function::Translate => {
            let s = string_arg(0);
            let from: Vec<char> = string_arg(1).chars().collect();
            let to: Vec<char> = string_arg(2).chars().collect();
            Object::Text(
                s.chars()
                    .filter_map(|c| match from.iter().position(|f| *f == c) {
                        Some(i) => to.get(i).copied(),
                        None => Some(c),
                    })
                    .collect(),
            )
        }
        Function::Name | Function::LocalName => {
            let nodes = nodes_arg(0);
            let name = nodes.first().map(|n| doc.name(*n)).unwrap_or_default();
            if function == Function::LocalName {
                Object::Text(name.rsplit(':').next().unwrap_or_default().to_string())
            } else {
                Object::Text(name)
            }
        }
        Function::Sum => Object::Number(
            nodes_arg(0)
                .iter()
                .map(|n| string_to_number(&doc.string_value(*n)))
                .sum(),
        ),
        Function::Floor => Object::Number(arg(0).into_number(doc).floor()),
        Function::Ceiling => Object::Number(arg(0).into_number(doc).ceil()),
        Function::Round => Object::Number(xpath_round(arg(0).into_number(doc))),
    }
}

/// XPath `round`: halves go towards positive infinity
fn xpath_round(n: f64) -> f64 {
    if n.is_finite() {
        (n + 0.5).floor()
    } else {
        n
    }
}

fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    let digits = s.strip_prefix('-').unwrap_or(s);
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && digits != ".";
    if valid {
        s.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
