//! Internal function names for CEL operators.

pub const CONDITIONAL: &str = "_?_:_";
pub const LOGICAL_AND: &str = "_&&_";
pub const LOGICAL_OR: &str = "_||_";
pub const LOGICAL_NOT: &str = "!_";
pub const NEGATE: &str = "-_";

pub const EQUALS: &str = "_==_";
pub const NOT_EQUALS: &str = "_!=_";
pub const LESS: &str = "_<_";
pub const LESS_EQUALS: &str = "_<=_";
pub const GREATER: &str = "_>_";
pub const GREATER_EQUALS: &str = "_>=_";
pub const IN: &str = "@in";

pub const ADD: &str = "_+_";
pub const SUBTRACT: &str = "_-_";
pub const MULTIPLY: &str = "_*_";
pub const DIVIDE: &str = "_/_";
pub const MODULO: &str = "_%_";

pub const INDEX: &str = "_[_]";
pub const OPT_INDEX: &str = "_[?_]";
pub const OPT_SELECT: &str = "_?._";

/// Loop guard used by the quantifier macros; false only for a strict `false`.
pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";
/// Map accumulation step used by `transformMap`.
pub const MAP_INSERT: &str = "cel.@mapInsert";

/// Map operator source text to its function name.
pub fn find(text: &str) -> Option<&'static str> {
    let function = match text {
        "?" => CONDITIONAL,
        "&&" => LOGICAL_AND,
        "||" => LOGICAL_OR,
        "!" => LOGICAL_NOT,
        "==" => EQUALS,
        "!=" => NOT_EQUALS,
        "<" => LESS,
        "<=" => LESS_EQUALS,
        ">" => GREATER,
        ">=" => GREATER_EQUALS,
        "in" => IN,
        "+" => ADD,
        "-" => SUBTRACT,
        "*" => MULTIPLY,
        "/" => DIVIDE,
        "%" => MODULO,
        _ => return None,
    };
    Some(function)
}

/// Source text of a binary operator function, for unparsing.
pub fn binary_symbol(function: &str) -> Option<&'static str> {
    let symbol = match function {
        LOGICAL_AND => "&&",
        LOGICAL_OR => "||",
        EQUALS => "==",
        NOT_EQUALS => "!=",
        LESS => "<",
        LESS_EQUALS => "<=",
        GREATER => ">",
        GREATER_EQUALS => ">=",
        IN => "in",
        ADD => "+",
        SUBTRACT => "-",
        MULTIPLY => "*",
        DIVIDE => "/",
        MODULO => "%",
        _ => return None,
    };
    Some(symbol)
}

/// Source text of a unary operator function, for unparsing.
pub fn unary_symbol(function: &str) -> Option<&'static str> {
    match function {
        LOGICAL_NOT => Some("!"),
        NEGATE => Some("-"),
        _ => None,
    }
}

/// Binding strength of an operator function (higher binds tighter), or
/// `None` for anything that is not an infix or prefix operator.
pub fn precedence(function: &str) -> Option<u8> {
    let prec = match function {
        CONDITIONAL => 1,
        LOGICAL_OR => 2,
        LOGICAL_AND => 3,
        EQUALS | NOT_EQUALS | LESS | LESS_EQUALS | GREATER | GREATER_EQUALS | IN => 4,
        ADD | SUBTRACT => 5,
        MULTIPLY | DIVIDE | MODULO => 6,
        LOGICAL_NOT | NEGATE => 7,
        _ => return None,
    };
    Some(prec)
}
