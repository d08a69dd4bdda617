//! Instance query: the selector language used by `ref.Path` in styles.
//!
//! ```text
//! query   := inter (('+' | '-' | '^') inter)*
//! inter   := cascade ('*' cascade)*
//! cascade := atom+
//! atom    := primary | '(' query ')'
//! primary := ('/' | '//') ['@' [Name] ':'] ([Name ':'] Name | '*') ['.' Name]
//! ```
//!
//! Queries run against a constructor tree and return [`NodePath`]s rather
//! than references, so callers can resolve each match mutably in turn.

use std::collections::HashSet;
use std::fmt;

use crate::error::QueryError;
use crate::repr::{AttSetterRepr, ConstructorRepr, ValueRepr};

/// One selector step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPrimary {
    /// `//` instead of `/`.
    pub descendants: bool,
    /// `@Prop:` filter. `Some("")` is `@:`, the default content.
    pub property: Option<String>,
    pub namespace: Option<String>,
    /// `None` is `*`.
    pub type_name: Option<String>,
    /// `.Name` filter on the instance name.
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Subtract,
    Xor,
}

impl SetOp {
    fn symbol(self) -> char {
        match self {
            SetOp::Union => '+',
            SetOp::Intersect => '*',
            SetOp::Subtract => '-',
            SetOp::Xor => '^',
        }
    }

    fn precedence(self) -> u8 {
        match self {
            SetOp::Intersect => 1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Primary(QueryPrimary),
    /// Run the right side from every match of the left side.
    Cascade(Box<Query>, Box<Query>),
    Set(SetOp, Box<Query>, Box<Query>),
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

struct QueryParser {
    chars: Vec<char>,
    pos: usize,
}

/// Parse query text.
pub fn parse_query(text: &str) -> Result<Query, QueryError> {
    let mut parser = QueryParser {
        chars: text.chars().collect(),
        pos: 0,
    };
    let query = parser.parse_query()?;
    parser.skip_whitespace();
    if let Some(c) = parser.peek() {
        return Err(QueryError::new(
            parser.pos,
            format!("unexpected '{}' after query", c),
        ));
    }
    Ok(query)
}

impl QueryParser {
    fn skip_whitespace(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), QueryError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", expected)))
        }
    }

    fn unexpected(&mut self, expected: &str) -> QueryError {
        match self.peek() {
            Some(c) => QueryError::new(self.pos, format!("expected {}, found '{}'", expected, c)),
            None => QueryError::new(self.pos, format!("expected {}, found end of query", expected)),
        }
    }

    fn name(&mut self) -> Option<String> {
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return None,
        }
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
        {
            self.pos += 1;
        }
        Some(self.chars[start..self.pos].iter().collect())
    }

    fn expect_name(&mut self) -> Result<String, QueryError> {
        match self.name() {
            Some(name) => Ok(name),
            None => Err(self.unexpected("a name")),
        }
    }

    fn parse_query(&mut self) -> Result<Query, QueryError> {
        let mut query = self.parse_inter()?;
        loop {
            let op = match self.peek() {
                Some('+') => SetOp::Union,
                Some('-') => SetOp::Subtract,
                Some('^') => SetOp::Xor,
                _ => return Ok(query),
            };
            self.pos += 1;
            let right = self.parse_inter()?;
            query = Query::Set(op, Box::new(query), Box::new(right));
        }
    }

    fn parse_inter(&mut self) -> Result<Query, QueryError> {
        let mut query = self.parse_cascade()?;
        while self.eat('*') {
            let right = self.parse_cascade()?;
            query = Query::Set(SetOp::Intersect, Box::new(query), Box::new(right));
        }
        Ok(query)
    }

    fn parse_cascade(&mut self) -> Result<Query, QueryError> {
        let mut query = self.parse_atom()?;
        while matches!(self.peek(), Some('/') | Some('(')) {
            let next = self.parse_atom()?;
            query = Query::Cascade(Box::new(query), Box::new(next));
        }
        Ok(query)
    }

    fn parse_atom(&mut self) -> Result<Query, QueryError> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let query = self.parse_query()?;
                self.expect(')')?;
                Ok(query)
            }
            Some('/') => self.parse_primary().map(Query::Primary),
            _ => Err(self.unexpected("'/', '//' or '('")),
        }
    }

    fn parse_primary(&mut self) -> Result<QueryPrimary, QueryError> {
        self.expect('/')?;
        // "//" must be contiguous.
        let descendants = self.chars.get(self.pos) == Some(&'/');
        if descendants {
            self.pos += 1;
        }

        let property = if self.eat('@') {
            let name = self.name().unwrap_or_default();
            self.expect(':')?;
            Some(name)
        } else {
            None
        };

        let (namespace, type_name) = if self.eat('*') {
            (None, None)
        } else {
            let first = self.expect_name()?;
            if self.eat(':') {
                (Some(first), Some(self.expect_name()?))
            } else {
                (None, Some(first))
            }
        };

        let reference = if self.eat('.') {
            Some(self.expect_name()?)
        } else {
            None
        };

        Ok(QueryPrimary {
            descendants,
            property,
            namespace,
            type_name,
            reference,
        })
    }
}

// ─── Printing ────────────────────────────────────────────────────────────────

const CASCADE_PRECEDENCE: u8 = 2;
const ATOM_PRECEDENCE: u8 = 3;

impl Query {
    fn precedence(&self) -> u8 {
        match self {
            Query::Primary(_) => ATOM_PRECEDENCE,
            Query::Cascade(..) => CASCADE_PRECEDENCE,
            Query::Set(op, ..) => op.precedence(),
        }
    }

    fn write_at(&self, out: &mut String, min_precedence: u8) {
        let parenthesized = self.precedence() < min_precedence;
        if parenthesized {
            out.push('(');
        }
        match self {
            Query::Primary(primary) => primary.write(out),
            Query::Cascade(left, right) => {
                left.write_at(out, CASCADE_PRECEDENCE);
                right.write_at(out, ATOM_PRECEDENCE);
            }
            Query::Set(op, left, right) => {
                left.write_at(out, op.precedence());
                out.push(' ');
                out.push(op.symbol());
                out.push(' ');
                right.write_at(out, op.precedence() + 1);
            }
        }
        if parenthesized {
            out.push(')');
        }
    }
}

impl QueryPrimary {
    fn write(&self, out: &mut String) {
        out.push_str(if self.descendants { "//" } else { "/" });
        if let Some(property) = &self.property {
            out.push('@');
            out.push_str(property);
            out.push(':');
        }
        if let Some(ns) = &self.namespace {
            out.push_str(ns);
            out.push(':');
        }
        out.push_str(self.type_name.as_deref().unwrap_or("*"));
        if let Some(reference) = &self.reference {
            out.push('.');
            out.push_str(reference);
        }
    }
}

/// Text form of a query; parses back to an equal query.
pub fn print_query(query: &Query) -> String {
    let mut out = String::new();
    query.write_at(&mut out, 0);
    out
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_query(self))
    }
}

// ─── Execution ───────────────────────────────────────────────────────────────

/// One step from a constructor down to a value: setter key and value index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub property: String,
    pub index: usize,
}

/// Location of a constructor below the root. The root itself is the empty
/// path. Steps through `-set` setters are included.
pub type NodePath = Vec<PathStep>;

/// Calls `visit` for every constructor held by `setter`, in document order,
/// with the setter key holding it and its path. `path` locates the owner of
/// `setter` and is restored before returning.
fn walk(
    setter: &AttSetterRepr,
    path: &mut NodePath,
    descendants: bool,
    visit: &mut dyn FnMut(&str, &ConstructorRepr, &NodePath),
) {
    for (key, value) in &setter.setters {
        for (index, item) in value.values.iter().enumerate() {
            if let ValueRepr::Text(_) = item {
                continue;
            }
            path.push(PathStep {
                property: key.clone(),
                index,
            });
            match item {
                ValueRepr::Constructor(ctor) => {
                    visit(key.as_str(), ctor, &*path);
                    if descendants {
                        walk(&ctor.setter, path, true, visit);
                    }
                }
                ValueRepr::AttSetter(nested) => walk(nested, path, descendants, visit),
                ValueRepr::Text(_) => {}
            }
            path.pop();
        }
    }
}

/// Matches in first-found order, without duplicates.
#[derive(Default)]
struct PathSet {
    paths: Vec<NodePath>,
    seen: HashSet<NodePath>,
}

impl PathSet {
    fn insert(&mut self, path: NodePath) {
        if !self.seen.contains(&path) {
            self.seen.insert(path.clone());
            self.paths.push(path);
        }
    }

    fn contains(&self, path: &NodePath) -> bool {
        self.seen.contains(path)
    }
}

impl QueryPrimary {
    /// `property` is `None` for the root.
    fn accepts(&self, property: Option<&str>, ctor: &ConstructorRepr) -> bool {
        if let Some(filter) = &self.property {
            if property != Some(filter.as_str()) {
                return false;
            }
        }
        if let Some(ns) = &self.namespace {
            if ctor.type_namespace.as_deref() != Some(ns.as_str()) {
                return false;
            }
        }
        if let Some(type_name) = &self.type_name {
            if ctor.type_name != *type_name {
                return false;
            }
        }
        match &self.reference {
            Some(reference) => ctor.instance_name() == Some(reference.as_str()),
            None => true,
        }
    }

    /// Matches below `context`; `None` is the virtual document above the root.
    fn evaluate(&self, root: &ConstructorRepr, context: Option<&NodePath>, out: &mut PathSet) {
        let (ctor, mut path) = match context {
            None => {
                if self.accepts(None, root) {
                    out.insert(NodePath::new());
                }
                if !self.descendants {
                    return;
                }
                (root, NodePath::new())
            }
            Some(path) => match resolve(root, path) {
                Some(ctor) => (ctor, path.clone()),
                None => return,
            },
        };
        let mut accept = |property: &str, ctor: &ConstructorRepr, path: &NodePath| {
            if self.accepts(Some(property), ctor) {
                out.insert(path.clone());
            }
        };
        walk(&ctor.setter, &mut path, self.descendants, &mut accept);
    }
}

fn combine(op: SetOp, left: PathSet, right: PathSet) -> PathSet {
    let mut out = PathSet::default();
    match op {
        SetOp::Union => {
            for path in left.paths.into_iter().chain(right.paths) {
                out.insert(path);
            }
        }
        SetOp::Intersect => {
            for path in left.paths.into_iter().filter(|p| right.contains(p)) {
                out.insert(path);
            }
        }
        SetOp::Subtract => {
            for path in left.paths.into_iter().filter(|p| !right.contains(p)) {
                out.insert(path);
            }
        }
        SetOp::Xor => {
            for path in left.paths.iter().filter(|p| !right.contains(p)) {
                out.insert(path.clone());
            }
            for path in right.paths.into_iter().filter(|p| !left.contains(p)) {
                out.insert(path);
            }
        }
    }
    out
}

fn evaluate(query: &Query, root: &ConstructorRepr, contexts: &[Option<NodePath>]) -> PathSet {
    match query {
        Query::Primary(primary) => {
            let mut out = PathSet::default();
            for context in contexts {
                primary.evaluate(root, context.as_ref(), &mut out);
            }
            out
        }
        Query::Cascade(left, right) => {
            let next: Vec<Option<NodePath>> = evaluate(left, root, contexts)
                .paths
                .into_iter()
                .map(Some)
                .collect();
            evaluate(right, root, &next)
        }
        Query::Set(op, left, right) => combine(
            *op,
            evaluate(left, root, contexts),
            evaluate(right, root, contexts),
        ),
    }
}

/// Run `query` against the tree rooted at `root`.
pub fn execute_query(query: &Query, root: &ConstructorRepr) -> Vec<NodePath> {
    evaluate(query, root, &[None]).paths
}

fn step<'a>(setter: &'a AttSetterRepr, step: &PathStep) -> Option<&'a ValueRepr> {
    setter.setters.get(&step.property)?.values.get(step.index)
}

/// The constructor at `path`, if the path still names one.
pub fn resolve<'a>(root: &'a ConstructorRepr, path: &[PathStep]) -> Option<&'a ConstructorRepr> {
    let Some((last, init)) = path.split_last() else {
        return Some(root);
    };
    let mut setter = &root.setter;
    for s in init {
        setter = step(setter, s)?.as_att_setter()?;
    }
    step(setter, last)?.as_constructor()
}

/// Mutable form of [`resolve`].
pub fn resolve_mut<'a>(
    root: &'a mut ConstructorRepr,
    path: &[PathStep],
) -> Option<&'a mut ConstructorRepr> {
    let Some((last, init)) = path.split_last() else {
        return Some(root);
    };
    let mut setter = &mut root.setter;
    for s in init {
        let value = setter.setters.get_mut(&s.property)?.values.get_mut(s.index)?;
        setter = match value {
            ValueRepr::Constructor(ctor) => &mut ctor.setter,
            ValueRepr::AttSetter(nested) => nested,
            ValueRepr::Text(_) => return None,
        };
    }
    match setter.setters.get_mut(&last.property)?.values.get_mut(last.index)? {
        ValueRepr::Constructor(ctor) => Some(ctor),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::{InstanceName, SetterValue, SET_BINDING};
    use pretty_assertions::assert_eq;

    fn ctor(ns: Option<&str>, name: &str, instance_name: Option<&str>) -> ConstructorRepr {
        let mut c = ConstructorRepr::new(ns.map(str::to_string), name);
        c.setter.instance_name = instance_name.map(|n| InstanceName {
            name: n.to_string(),
            from_style: false,
        });
        c
    }

    fn hold(parent: &mut AttSetterRepr, key: &str, value: ValueRepr) {
        parent
            .setters
            .entry(key.to_string())
            .or_insert_with(SetterValue::default)
            .values
            .push(value);
    }

    /// Window
    ///   "" -> Button(ok), x:Label
    ///   Footer -> Panel
    ///               "" -> Button(cancel)
    ///   Bounds-set -> { Child -> Label }
    fn tree() -> ConstructorRepr {
        let mut window = ctor(None, "Window", Some("main"));
        hold(&mut window.setter, "", ValueRepr::Constructor(ctor(None, "Button", Some("ok"))));
        hold(&mut window.setter, "", ValueRepr::Constructor(ctor(Some("x"), "Label", None)));

        let mut panel = ctor(None, "Panel", None);
        hold(&mut panel.setter, "", ValueRepr::Constructor(ctor(None, "Button", Some("cancel"))));
        hold(&mut window.setter, "Footer", ValueRepr::Constructor(panel));

        let mut bounds = AttSetterRepr::default();
        hold(&mut bounds, "Child", ValueRepr::Constructor(ctor(None, "Label", None)));
        hold(&mut window.setter, "Bounds", ValueRepr::AttSetter(bounds));
        window.setter.setters.get_mut("Bounds").unwrap().binding = Some(SET_BINDING.to_string());
        window
    }

    fn names(root: &ConstructorRepr, text: &str) -> Vec<String> {
        let query = parse_query(text).unwrap();
        execute_query(&query, root)
            .iter()
            .map(|p| {
                let c = resolve(root, p).unwrap();
                match c.instance_name() {
                    Some(n) => format!("{}.{}", c.qualified_name(), n),
                    None => c.qualified_name(),
                }
            })
            .collect()
    }

    #[test]
    fn test_root_matches_from_document() {
        let root = tree();
        assert_eq!(names(&root, "/Window"), vec!["Window.main"]);
        assert!(names(&root, "/Button").is_empty());
    }

    #[test]
    fn test_descendants_in_document_order() {
        let root = tree();
        assert_eq!(
            names(&root, "//*"),
            vec![
                "Window.main",
                "Button.ok",
                "x:Label",
                "Label",
                "Panel",
                "Button.cancel",
            ]
        );
        assert_eq!(names(&root, "//Button"), vec!["Button.ok", "Button.cancel"]);
    }

    #[test]
    fn test_cascade_and_filters() {
        let root = tree();
        assert_eq!(names(&root, "/Window/Button"), vec!["Button.ok"]);
        assert_eq!(names(&root, "/Window/@Footer:*//Button"), vec!["Button.cancel"]);
        assert_eq!(names(&root, "//@:Button"), vec!["Button.ok", "Button.cancel"]);
        assert_eq!(names(&root, "//x:Label"), vec!["x:Label"]);
        assert_eq!(names(&root, "//Label"), vec!["x:Label", "Label"]);
        assert_eq!(names(&root, "//Button.cancel"), vec!["Button.cancel"]);
    }

    #[test]
    fn test_set_nodes_are_transparent() {
        let root = tree();
        assert_eq!(names(&root, "/Window/@Child:Label"), vec!["Label"]);
    }

    #[test]
    fn test_set_operators() {
        let root = tree();
        assert_eq!(
            names(&root, "//Button + //Label"),
            vec!["Button.ok", "Button.cancel", "x:Label", "Label"]
        );
        assert_eq!(names(&root, "//* * //Button.ok"), vec!["Button.ok"]);
        assert_eq!(names(&root, "//Button - //Button.ok"), vec!["Button.cancel"]);
        assert_eq!(
            names(&root, "//Button ^ (//Button.ok + //Panel)"),
            vec!["Button.cancel", "Panel"]
        );
    }

    #[test]
    fn test_union_is_deduplicated() {
        let root = tree();
        assert_eq!(names(&root, "//Button + //Button"), vec!["Button.ok", "Button.cancel"]);
    }

    #[test]
    fn test_wide_tree_stays_fast() {
        let mut stack = ctor(None, "Stack", None);
        for i in 0..20_000 {
            let name = if i % 2 == 0 { Some("even") } else { None };
            hold(&mut stack.setter, "", ValueRepr::Constructor(ctor(None, "Button", name)));
        }

        let all = execute_query(&parse_query("//Button").unwrap(), &stack);
        assert_eq!(all.len(), 20_000);
        assert_eq!(
            all[1],
            vec![PathStep {
                property: String::new(),
                index: 1,
            }]
        );

        let odd = parse_query("(//Button + /Stack/Button) - //Button.even").unwrap();
        assert_eq!(execute_query(&odd, &stack).len(), 10_000);
        let none = parse_query("//Button.even * (//* ^ //Button.even)").unwrap();
        assert!(execute_query(&none, &stack).is_empty());
    }

    #[test]
    fn test_print_reparses_to_same_query() {
        for text in [
            "/Button",
            "//@:x:Label.name",
            "/Window//@Footer:*",
            "(//A + //B) * //C",
            "//A - (//B ^ //C)",
            "/A(/B + /C)/D",
            "//A * //B + //C",
        ] {
            let query = parse_query(text).unwrap();
            let printed = print_query(&query);
            assert_eq!(parse_query(&printed).unwrap(), query, "{} -> {}", text, printed);
        }
    }

    #[test]
    fn test_print_minimal_parentheses() {
        let query = parse_query("( //A * //B ) + //C").unwrap();
        assert_eq!(print_query(&query), "//A * //B + //C");
        let query = parse_query("//A * (//B + //C)").unwrap();
        assert_eq!(print_query(&query), "//A * (//B + //C)");
    }

    #[test]
    fn test_syntax_errors() {
        let cases = [
            ("Button", 0),
            ("/", 1),
            ("/A +", 4),
            ("(/A", 3),
            ("/A )", 3),
            ("/@P/A", 3),
        ];
        for (text, offset) in cases {
            let err = parse_query(text).unwrap_err();
            assert_eq!(err.offset, offset, "{:?}: {}", text, err);
        }
    }

    #[test]
    fn test_resolve_mut_reaches_nested_nodes() {
        let mut root = tree();
        let query = parse_query("//Label").unwrap();
        for path in execute_query(&query, &root.clone()) {
            let label = resolve_mut(&mut root, &path).unwrap();
            label.style_name = Some("Flat".to_string());
        }
        assert_eq!(names(&root, "//Label").len(), 2);
        let bounds = root.setter.setters["Bounds"].values[0].as_att_setter().unwrap();
        let inner = bounds.setters["Child"].values[0].as_constructor().unwrap();
        assert_eq!(inner.style_name.as_deref(), Some("Flat"));
    }
}
