use crate::ast::TypeSpec;
use crate::token::TokenKind;
use crate::util::{FastHashMap, fast_hash_map_new};

/// Interned type. Base types have fixed ids, user structs are appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const INVALID: TypeId = TypeId(u32::MAX);

    pub const VOID: TypeId = TypeId(0);
    pub const INT: TypeId = TypeId(1);
    pub const FLOAT: TypeId = TypeId(2);
    pub const STRING: TypeId = TypeId(3);
    pub const OBJECT: TypeId = TypeId(4);
    pub const VECTOR: TypeId = TypeId(5);
    pub const ACTION: TypeId = TypeId(6);
    pub const EFFECT: TypeId = TypeId(7);
    pub const EVENT: TypeId = TypeId(8);
    pub const LOCATION: TypeId = TypeId(9);
    pub const TALENT: TypeId = TypeId(10);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

const BASE_TYPES: [&str; 11] = [
    "void", "int", "float", "string", "object", "vector", "action", "effect", "event",
    "location", "talent",
];

/// Name registry for types. Struct types are interned on first sight; the
/// defining declaration is looked up by name at the use site, so the table
/// itself stores nothing but names.
#[derive(Debug, Clone)]
pub struct TypeTable {
    names: Vec<String>,
    ids: FastHashMap<String, TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            names: Vec::with_capacity(BASE_TYPES.len()),
            ids: fast_hash_map_new(),
        };
        for name in BASE_TYPES {
            table.register(name);
        }
        table
    }

    pub fn register(&mut self, name: &str) -> TypeId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = TypeId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.ids.get(name).copied()
    }

    pub fn name_of(&self, id: TypeId) -> &str {
        self.names
            .get(id.0 as usize)
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }

    /// Type of a written `TypeSpec`, interning struct names on first use.
    pub fn of_spec(&mut self, spec: &TypeSpec) -> TypeId {
        match (spec.kind, &spec.struct_name) {
            (TokenKind::Struct, Some(name)) => self.register(name),
            (TokenKind::Void, _) => TypeId::VOID,
            (TokenKind::Int, _) => TypeId::INT,
            (TokenKind::Float, _) => TypeId::FLOAT,
            (TokenKind::String, _) => TypeId::STRING,
            (TokenKind::Object, _) => TypeId::OBJECT,
            (TokenKind::Vector, _) => TypeId::VECTOR,
            (TokenKind::Action, _) => TypeId::ACTION,
            (TokenKind::Effect, _) => TypeId::EFFECT,
            (TokenKind::Event, _) => TypeId::EVENT,
            (TokenKind::Location, _) => TypeId::LOCATION,
            (TokenKind::Talent, _) => TypeId::TALENT,
            _ => TypeId::INVALID,
        }
    }

    /// True past the base types, i.e. a user declared struct.
    pub fn is_struct(&self, id: TypeId) -> bool {
        id.is_valid() && id.0 as usize >= BASE_TYPES.len()
    }
}

fn is_numeric(t: TypeId) -> bool {
    t == TypeId::INT || t == TypeId::FLOAT
}

fn numeric_result(lhs: TypeId, rhs: TypeId) -> TypeId {
    if lhs == TypeId::FLOAT || rhs == TypeId::FLOAT {
        TypeId::FLOAT
    } else {
        TypeId::INT
    }
}

/// The only implicit conversion is `int` to `float`.
pub fn is_convertible(from: TypeId, to: TypeId) -> bool {
    from.is_valid() && (from == to || (from == TypeId::INT && to == TypeId::FLOAT))
}

/// Result type of an arithmetic, shift or bitwise operator, `None` when the
/// operands do not fit the operator.
pub fn binary_result(op: TokenKind, lhs: TypeId, rhs: TypeId) -> Option<TypeId> {
    match op {
        TokenKind::Add => {
            if is_numeric(lhs) && is_numeric(rhs) {
                Some(numeric_result(lhs, rhs))
            } else if lhs == TypeId::VECTOR && rhs == TypeId::VECTOR {
                Some(TypeId::VECTOR)
            } else if lhs == TypeId::STRING && rhs == TypeId::STRING {
                Some(TypeId::STRING)
            } else {
                None
            }
        }
        TokenKind::Sub => {
            if is_numeric(lhs) && is_numeric(rhs) {
                Some(numeric_result(lhs, rhs))
            } else if lhs == TypeId::VECTOR && rhs == TypeId::VECTOR {
                Some(TypeId::VECTOR)
            } else {
                None
            }
        }
        TokenKind::Mul => {
            if is_numeric(lhs) && is_numeric(rhs) {
                Some(numeric_result(lhs, rhs))
            } else if (lhs == TypeId::VECTOR && rhs == TypeId::FLOAT)
                || (lhs == TypeId::FLOAT && rhs == TypeId::VECTOR)
            {
                Some(TypeId::VECTOR)
            } else {
                None
            }
        }
        TokenKind::Div => {
            if is_numeric(lhs) && is_numeric(rhs) {
                Some(numeric_result(lhs, rhs))
            } else if lhs == TypeId::VECTOR && rhs == TypeId::FLOAT {
                // Only vector / float; float / vector has no meaning.
                Some(TypeId::VECTOR)
            } else {
                None
            }
        }
        TokenKind::Mod
        | TokenKind::Shl
        | TokenKind::Shr
        | TokenKind::Ushr
        | TokenKind::BitAnd
        | TokenKind::BitOr
        | TokenKind::BitXor => {
            if lhs == TypeId::INT && rhs == TypeId::INT {
                Some(TypeId::INT)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Comparisons always produce `int`; this decides whether the operand pair
/// is allowed at all.
pub fn comparison_ok(op: TokenKind, lhs: TypeId, rhs: TypeId) -> bool {
    match op {
        TokenKind::Eq | TokenKind::Ne => {
            let comparable = matches!(
                lhs,
                TypeId::INT | TypeId::FLOAT | TypeId::STRING | TypeId::OBJECT | TypeId::VECTOR
            );
            comparable && (is_convertible(lhs, rhs) || is_convertible(rhs, lhs))
        }
        TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => {
            is_numeric(lhs) && is_numeric(rhs)
        }
        _ => false,
    }
}

/// Result type of a prefix or postfix operator applied to `operand`.
pub fn unary_result(op: TokenKind, operand: TypeId) -> Option<TypeId> {
    match op {
        TokenKind::Sub => is_numeric(operand).then_some(operand),
        TokenKind::Not | TokenKind::Tilde | TokenKind::PlusPlus | TokenKind::MinusMinus => {
            (operand == TypeId::INT).then_some(TypeId::INT)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_type_ids_are_stable() {
        let table = TypeTable::new();
        assert_eq!(table.id_of("void"), Some(TypeId::VOID));
        assert_eq!(table.id_of("int"), Some(TypeId::INT));
        assert_eq!(table.id_of("talent"), Some(TypeId::TALENT));
        assert_eq!(table.name_of(TypeId::VECTOR), "vector");
    }

    #[test]
    fn struct_types_are_interned_once() {
        let mut table = TypeTable::new();
        let a = table.register("Vec2");
        let b = table.register("Vec2");
        assert_eq!(a, b);
        assert!(table.is_struct(a));
        assert!(!table.is_struct(TypeId::INT));
    }

    #[test]
    fn int_widens_to_float_only() {
        assert!(is_convertible(TypeId::INT, TypeId::FLOAT));
        assert!(!is_convertible(TypeId::FLOAT, TypeId::INT));
        assert!(!is_convertible(TypeId::STRING, TypeId::FLOAT));
        assert!(is_convertible(TypeId::OBJECT, TypeId::OBJECT));
        assert!(!is_convertible(TypeId::INVALID, TypeId::INVALID));
    }

    #[test]
    fn arithmetic_rules() {
        use TokenKind::*;
        assert_eq!(binary_result(Add, TypeId::INT, TypeId::INT), Some(TypeId::INT));
        assert_eq!(binary_result(Add, TypeId::INT, TypeId::FLOAT), Some(TypeId::FLOAT));
        assert_eq!(
            binary_result(Add, TypeId::STRING, TypeId::STRING),
            Some(TypeId::STRING)
        );
        assert_eq!(binary_result(Sub, TypeId::STRING, TypeId::STRING), None);
        assert_eq!(
            binary_result(Mul, TypeId::FLOAT, TypeId::VECTOR),
            Some(TypeId::VECTOR)
        );
        assert_eq!(binary_result(Div, TypeId::FLOAT, TypeId::VECTOR), None);
        assert_eq!(
            binary_result(Div, TypeId::VECTOR, TypeId::FLOAT),
            Some(TypeId::VECTOR)
        );
        assert_eq!(binary_result(Mod, TypeId::INT, TypeId::FLOAT), None);
        assert_eq!(binary_result(Shl, TypeId::INT, TypeId::INT), Some(TypeId::INT));
        assert_eq!(binary_result(BitOr, TypeId::FLOAT, TypeId::INT), None);
    }

    #[test]
    fn comparison_rules() {
        use TokenKind::*;
        assert!(comparison_ok(Eq, TypeId::OBJECT, TypeId::OBJECT));
        assert!(comparison_ok(Eq, TypeId::INT, TypeId::FLOAT));
        assert!(!comparison_ok(Eq, TypeId::STRING, TypeId::INT));
        assert!(!comparison_ok(Eq, TypeId::EFFECT, TypeId::EFFECT));
        assert!(comparison_ok(Lt, TypeId::INT, TypeId::INT));
        assert!(!comparison_ok(Lt, TypeId::STRING, TypeId::STRING));
    }

    #[test]
    fn unary_rules() {
        use TokenKind::*;
        assert_eq!(unary_result(Sub, TypeId::FLOAT), Some(TypeId::FLOAT));
        assert_eq!(unary_result(Tilde, TypeId::INT), Some(TypeId::INT));
        assert_eq!(unary_result(Tilde, TypeId::FLOAT), None);
        assert_eq!(unary_result(PlusPlus, TypeId::INT), Some(TypeId::INT));
        assert_eq!(unary_result(Not, TypeId::STRING), None);
    }
}
