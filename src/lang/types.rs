//! Type-checker results consumed by the pattern engine.
//!
//! The front-end that parses and type-checks the target language is an
//! external collaborator; it hands the toolkit a [`TypeInfo`] mapping
//! expressions to objects, types, and constant values. During matching this
//! data is read-only.

use std::collections::HashMap;
use std::fmt;

use super::ast::NodeId;

/// Handle into the object arena of a [`TypeInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(pub u32);

/// A language object: something an identifier can resolve to.
#[derive(Debug, Clone)]
pub enum Object {
    /// A function or method. `full_name` is the qualified name: for a
    /// top-level function `"pkgpath.Name"`, for a method
    /// `"(pkgpath.Type).Name"` or `"(*pkgpath.Type).Name"`.
    Func { full_name: String },

    /// A universe-scope builtin, named by its short name.
    Builtin { name: String },

    /// A named type or type alias. `name` is the textual form of the type,
    /// qualified the way the type-checker prints it (`"pkgpath.T"`).
    TypeName {
        name: String,
        /// True when declared at package scope; matching requires it.
        package_scope: bool,
        /// For aliases, the aliased type; `None` for defined types.
        alias_of: Option<Type>,
    },

    /// A package-level or local variable.
    Var {
        name: String,
        pkg_path: Option<String>,
        package_scope: bool,
    },

    /// A declared constant.
    Const {
        name: String,
        pkg_path: Option<String>,
        package_scope: bool,
    },
}

impl Object {
    /// Simple (unqualified) name of the object.
    pub fn name(&self) -> &str {
        match self {
            Object::Func { full_name } => full_name
                .rsplit('.')
                .next()
                .unwrap_or(full_name.as_str()),
            Object::Builtin { name } => name,
            Object::TypeName { name, .. } => name,
            Object::Var { name, .. } => name,
            Object::Const { name, .. } => name,
        }
    }
}

/// A type of the target language, in the small fragment the engines need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// A predeclared basic type such as `int` or `string`.
    Basic(String),
    /// A defined or alias type, referring to its [`Object::TypeName`].
    Named(ObjId),
    /// Pointer to an element type.
    Pointer(Box<Type>),
    /// Slice of an element type.
    Slice(Box<Type>),
}

impl Type {
    /// Textual form of the type, with named types fully qualified the way
    /// the type-checker prints them.
    pub fn type_string(&self, info: &TypeInfo) -> String {
        match self {
            Type::Basic(name) => name.clone(),
            Type::Named(obj) => match info.object(*obj) {
                Object::TypeName { name, .. } => name.clone(),
                other => other.name().to_string(),
            },
            Type::Pointer(elem) => format!("*{}", elem.type_string(info)),
            Type::Slice(elem) => format!("[]{}", elem.type_string(info)),
        }
    }

    /// The element type of a pointer type.
    ///
    /// Panics if `self` is not a pointer; callers only dereference cell
    /// types they created as pointers.
    pub fn deref(&self) -> Type {
        match self {
            Type::Pointer(elem) => (**elem).clone(),
            other => panic!("deref of non-pointer type {:?}", other),
        }
    }
}

/// A constant value assigned by the type checker.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i128),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{}", v),
            ConstValue::Float(v) => write!(f, "{}", v),
            ConstValue::Str(v) => write!(f, "{:?}", v),
            ConstValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// The type and, when constant, value of an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAndValue {
    pub ty: Type,
    pub value: Option<ConstValue>,
}

/// Read-only type-checker results for one analysis unit.
#[derive(Debug, Default)]
pub struct TypeInfo {
    objects: Vec<Object>,
    /// Type and constant value per expression.
    pub types: HashMap<NodeId, TypeAndValue>,
    /// Object used by each identifier (for selector expressions, keyed by
    /// the selected identifier).
    pub uses: HashMap<NodeId, ObjId>,
}

impl TypeInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an object, returning its handle.
    pub fn add_object(&mut self, obj: Object) -> ObjId {
        let id = ObjId(self.objects.len() as u32);
        self.objects.push(obj);
        id
    }

    pub fn object(&self, id: ObjId) -> &Object {
        &self.objects[id.0 as usize]
    }

    /// The object a source identifier resolves to, if the type checker
    /// recorded one.
    pub fn object_of(&self, ident: NodeId) -> Option<ObjId> {
        self.uses.get(&ident).copied()
    }

    /// Record that `ident` resolves to `obj`.
    pub fn record_use(&mut self, ident: NodeId, obj: ObjId) {
        self.uses.insert(ident, obj);
    }

    /// Record the type (and constant value) of an expression.
    pub fn record_type(&mut self, expr: NodeId, tv: TypeAndValue) {
        self.types.insert(expr, tv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_value_display() {
        assert_eq!(ConstValue::Int(42).to_string(), "42");
        assert_eq!(ConstValue::Int(-3).to_string(), "-3");
        assert_eq!(ConstValue::Bool(true).to_string(), "true");
        assert_eq!(ConstValue::Str("x".into()).to_string(), "\"x\"");
    }

    #[test]
    fn test_type_string_chases_names() {
        let mut info = TypeInfo::new();
        let obj = info.add_object(Object::TypeName {
            name: "pkg.T".into(),
            package_scope: true,
            alias_of: None,
        });
        let named = Type::Named(obj);
        assert_eq!(named.type_string(&info), "pkg.T");
        assert_eq!(
            Type::Pointer(Box::new(named)).type_string(&info),
            "*pkg.T"
        );
    }
}
