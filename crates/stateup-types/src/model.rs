use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Structural type of an attribute, or the implied type of a whole block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    Bool,
    Number,
    String,
    List(Box<AttrType>),
    Set(Box<AttrType>),
    Map(Box<AttrType>),
    Object(IndexMap<String, AttrType>),
}

impl AttrType {
    pub fn list(elem: AttrType) -> Self {
        AttrType::List(Box::new(elem))
    }

    pub fn set(elem: AttrType) -> Self {
        AttrType::Set(Box::new(elem))
    }

    pub fn map(elem: AttrType) -> Self {
        AttrType::Map(Box::new(elem))
    }

    pub fn object(fields: impl IntoIterator<Item = (impl Into<String>, AttrType)>) -> Self {
        AttrType::Object(
            fields
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        )
    }

    /// Name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AttrType::Bool => "bool",
            AttrType::Number => "number",
            AttrType::String => "string",
            AttrType::List(_) => "list",
            AttrType::Set(_) => "set",
            AttrType::Map(_) => "map",
            AttrType::Object(_) => "object",
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, AttrType::Bool | AttrType::Number | AttrType::String)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, AttrType::List(_) | AttrType::Set(_) | AttrType::Map(_))
    }

    /// Element type of a list, set or map.
    pub fn element_type(&self) -> Option<&AttrType> {
        match self {
            AttrType::List(elem) | AttrType::Set(elem) | AttrType::Map(elem) => Some(elem),
            _ => None,
        }
    }
}

/// A schema attribute: its type plus the usual configurability flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub ty: AttrType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
}

impl Attribute {
    pub fn required(ty: AttrType) -> Self {
        Self {
            ty,
            required: true,
            optional: false,
            computed: false,
        }
    }

    pub fn optional(ty: AttrType) -> Self {
        Self {
            ty,
            required: false,
            optional: true,
            computed: false,
        }
    }

    pub fn computed(ty: AttrType) -> Self {
        Self {
            ty,
            required: false,
            optional: false,
            computed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingMode {
    /// At most one object, stored as an object or null.
    Single,
    /// Exactly one object, never null.
    Group,
    List,
    Set,
    Map,
}

/// A nested block type declared inside a [`Block`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedBlock {
    pub nesting: NestingMode,
    pub block: Block,
    #[serde(default)]
    pub min_items: u64,
    #[serde(default)]
    pub max_items: u64,
}

impl NestedBlock {
    pub fn new(nesting: NestingMode, block: Block) -> Self {
        Self {
            nesting,
            block,
            min_items: 0,
            max_items: 0,
        }
    }

    pub fn list(block: Block) -> Self {
        Self::new(NestingMode::List, block)
    }

    pub fn set(block: Block) -> Self {
        Self::new(NestingMode::Set, block)
    }

    pub fn single(block: Block) -> Self {
        Self::new(NestingMode::Single, block)
    }

    pub fn with_max_items(mut self, max_items: u64) -> Self {
        self.max_items = max_items;
        self
    }

    /// Type of the value stored under this block's name in the parent object.
    pub fn implied_type(&self) -> AttrType {
        let object = self.block.implied_type();
        match self.nesting {
            NestingMode::Single | NestingMode::Group => object,
            NestingMode::List => AttrType::list(object),
            NestingMode::Set => AttrType::set(object),
            NestingMode::Map => AttrType::map(object),
        }
    }

    /// Empty value stored for this block when no data was recorded for it.
    /// `Single` blocks stay null.
    pub fn empty_value(&self) -> Option<crate::TreeValue> {
        match self.nesting {
            NestingMode::Single => None,
            NestingMode::Group => Some(crate::TreeValue::Map(IndexMap::new())),
            NestingMode::List | NestingMode::Set => Some(crate::TreeValue::List(Vec::new())),
            NestingMode::Map => Some(crate::TreeValue::Map(IndexMap::new())),
        }
    }
}

/// Configuration block of a resource: attributes plus nested block types.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub attributes: IndexMap<String, Attribute>,
    #[serde(default)]
    pub block_types: IndexMap<String, NestedBlock>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn block(mut self, name: impl Into<String>, nested: NestedBlock) -> Self {
        self.block_types.insert(name.into(), nested);
        self
    }

    /// Object type with one field per attribute and nested block.
    pub fn implied_type(&self) -> AttrType {
        let mut fields = IndexMap::new();
        for (name, attr) in &self.attributes {
            fields.insert(name.clone(), attr.ty.clone());
        }
        for (name, nested) in &self.block_types {
            fields.insert(name.clone(), nested.implied_type());
        }
        AttrType::Object(fields)
    }
}
