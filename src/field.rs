//! Compiled field trees
//!
//! Fields live in a flat arena owned by [`CompiledField`]; children are
//! indices into it and each node keeps the index of its parent. The parent
//! index only serves navigation (dotted paths in diagnostics), ownership stays
//! strictly with the arena.

use crate::error::CompileError;
use crate::rules::{NodeRules, TextRules};
use crate::source::FieldDef;
use crate::types::{Kind, TypeSpec};
use crate::xpath::XPath;

/// Index of a field inside its [`CompiledField`]; the root is always `0`
pub type FieldId = usize;

#[derive(Debug, Clone)]
pub(crate) struct FieldNode {
    pub(crate) title: String,
    pub(crate) ty: TypeSpec,
    pub(crate) candidates: Vec<XPath>,
    pub(crate) text_rules: TextRules,
    pub(crate) node_rules: NodeRules,
    pub(crate) optional: bool,
    pub(crate) multiple: bool,
    pub(crate) unique: bool,
    pub(crate) preserve_attr: bool,
    pub(crate) dont_store: bool,
    pub(crate) children: Vec<FieldId>,
    pub(crate) parent: Option<FieldId>,
}

/// Immutable, execution-ready field tree
#[derive(Debug, Clone)]
pub struct CompiledField {
    nodes: Vec<FieldNode>,
}

impl CompiledField {
    pub fn compile(def: &FieldDef) -> Result<Self, CompileError> {
        let mut nodes = Vec::new();
        compile_node(def, &mut nodes)?;

        for id in 0..nodes.len() {
            for child in nodes[id].children.clone() {
                nodes[child].parent = Some(id);
            }
        }
        Ok(Self { nodes })
    }

    pub fn root(&self) -> Field<'_> {
        self.field(0)
    }

    fn field(&self, id: FieldId) -> Field<'_> {
        Field { tree: self, id }
    }

    pub fn get(&self, id: FieldId) -> Option<Field<'_>> {
        (id < self.nodes.len()).then(|| self.field(id))
    }

    /// Every field, pre-order from the root
    pub fn iter(&self) -> impl Iterator<Item = Field<'_>> {
        (0..self.nodes.len()).map(|id| self.field(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dotted path from the root, e.g. `Item.Link`
    pub fn relative_path(&self, id: FieldId) -> String {
        let mut titles = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            let Some(node) = self.nodes.get(current) else {
                break;
            };
            titles.push(node.title.as_str());
            next = node.parent;
        }
        titles.reverse();
        titles.join(".")
    }

    /// Look a field up by its dotted path; the first segment names the root
    pub fn find(&self, path: &str) -> Option<Field<'_>> {
        let mut segments = path.split('.');
        let root = self.root();
        if segments.next()? != root.title() {
            return None;
        }
        segments.try_fold(root, |field, title| {
            field.children().find(|child| child.title() == title)
        })
    }

    pub(crate) fn node(&self, id: FieldId) -> &FieldNode {
        &self.nodes[id]
    }
}

fn compile_node(def: &FieldDef, nodes: &mut Vec<FieldNode>) -> Result<FieldId, CompileError> {
    let candidates = def
        .path
        .iter()
        .map(|expr| {
            XPath::compile(expr).map_err(|source| CompileError::XPath {
                category: "Path",
                expr: expr.to_string(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.in_field(&def.title))?;
    let text_rules =
        TextRules::compile(def.data.as_ref()).map_err(|e| e.in_field(&def.title))?;
    let node_rules =
        NodeRules::compile(def.xdata.as_ref()).map_err(|e| e.in_field(&def.title))?;

    if def.type_name.trim().is_empty() {
        return Err(CompileError::MissingType {
            title: def.title.clone(),
        });
    }
    let ty = TypeSpec::parse(&def.type_name).map_err(|e| e.in_field(&def.title))?;

    let id = nodes.len();
    nodes.push(FieldNode {
        title: def.title.clone(),
        ty,
        candidates,
        text_rules,
        node_rules,
        optional: def.optional,
        multiple: def.multiple,
        unique: def.unique,
        preserve_attr: def.preserve_attr,
        dont_store: def.dont_store,
        children: Vec::new(),
        parent: None,
    });

    let mut children = Vec::with_capacity(def.fields.len());
    for child in &def.fields {
        children.push(compile_node(child, nodes)?);
    }
    nodes[id].children = children;
    Ok(id)
}

/// Borrowed view of one field in a compiled tree
#[derive(Clone, Copy)]
pub struct Field<'a> {
    pub(crate) tree: &'a CompiledField,
    pub(crate) id: FieldId,
}

impl<'a> Field<'a> {
    pub(crate) fn node(&self) -> &'a FieldNode {
        self.tree.node(self.id)
    }

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn title(&self) -> &'a str {
        &self.node().title
    }

    pub fn type_spec(&self) -> TypeSpec {
        self.node().ty
    }

    pub fn kind(&self) -> Kind {
        self.node().ty.kind
    }

    pub fn candidates(&self) -> &'a [XPath] {
        &self.node().candidates
    }

    pub fn is_optional(&self) -> bool {
        self.node().optional
    }

    /// `multiple` flag or an array type
    pub fn is_multiple(&self) -> bool {
        self.node().multiple || self.node().ty.is_array
    }

    pub fn is_unique(&self) -> bool {
        self.node().unique
    }

    pub fn preserve_attr(&self) -> bool {
        self.node().preserve_attr
    }

    /// Marked as not to be persisted by the storage layer
    pub fn dont_store(&self) -> bool {
        self.node().dont_store
    }

    pub fn children(&self) -> impl Iterator<Item = Field<'a>> + 'a {
        let tree = self.tree;
        self.node().children.iter().map(move |&id| tree.field(id))
    }

    pub fn parent(&self) -> Option<Field<'a>> {
        self.node().parent.map(|id| self.tree.field(id))
    }

    pub fn relative_path(&self) -> String {
        self.tree.relative_path(self.id)
    }
}

impl std::fmt::Debug for Field<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("path", &self.relative_path())
            .field("type", &self.type_spec())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Lines, RegexRules};

    fn listing() -> FieldDef {
        let mut item = FieldDef::new("Item", "struct", "//li");
        item.multiple = true;
        let mut link = FieldDef::new("Link", "struct", "a");
        link.fields.push(FieldDef::new("Href", "string", "@href"));
        link.fields.push(FieldDef::new("Text", "string", "."));
        item.fields.push(link);
        let mut price = FieldDef::new("Price", "int", "span");
        price.optional = true;
        price.dont_store = true;
        item.fields.push(price);
        item
    }

    #[test]
    fn test_compile_tree() {
        let field = CompiledField::compile(&listing()).unwrap();
        assert_eq!(field.len(), 5);
        let root = field.root();
        assert_eq!(root.title(), "Item");
        assert!(root.is_multiple());
        assert!(root.parent().is_none());

        let titles: Vec<_> = root.children().map(|c| c.title()).collect();
        assert_eq!(titles, vec!["Link", "Price"]);

        let price = field.find("Item.Price").unwrap();
        assert!(price.is_optional());
        assert!(price.dont_store());
        assert_eq!(price.kind(), Kind::Int);
        assert_eq!(price.parent().map(|p| p.title()), Some("Item"));
    }

    #[test]
    fn test_relative_path() {
        let field = CompiledField::compile(&listing()).unwrap();
        let href = field.find("Item.Link.Href").unwrap();
        assert_eq!(href.relative_path(), "Item.Link.Href");
        assert_eq!(field.relative_path(0), "Item");
        assert!(field.find("Link.Href").is_none());
        assert!(field.find("Item.Missing").is_none());

        let paths: Vec<_> = field.iter().map(|f| f.relative_path()).collect();
        assert_eq!(
            paths,
            vec!["Item", "Item.Link", "Item.Link.Href", "Item.Link.Text", "Item.Price"]
        );
    }

    #[test]
    fn test_missing_type_names_field() {
        let mut def = listing();
        def.fields[0].fields[1].type_name.clear();
        let err = CompiledField::compile(&def).unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingType {
                title: "Text".to_string()
            }
        );
    }

    #[test]
    fn test_bad_candidate_names_expression() {
        let mut def = FieldDef::new("Title", "string", "//h1\n//h2[");
        def.path.push("//h3");
        let err = CompiledField::compile(&def).unwrap_err();
        match err {
            CompileError::Field { title, source } => {
                assert_eq!(title, "Title");
                assert!(matches!(*source, CompileError::XPath { ref expr, .. } if expr == "//h2["));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_regex_and_type() {
        let mut def = FieldDef::new("Price", "int", "//b");
        def.data = Some(RegexRules {
            remove: Lines::new("[unclosed"),
            ..Default::default()
        });
        assert!(matches!(
            CompiledField::compile(&def),
            Err(CompileError::Field { .. })
        ));

        let def = FieldDef::new("Flag", "bool", "//b");
        let err = CompiledField::compile(&def).unwrap_err();
        assert_eq!(err.to_string(), "field 'Flag': unrecognized type 'bool'");
    }
}
