//! Syntax tree of a module.
//!
//! The same tree is the document model of the JSON form, so every node
//! derives `serde` traits. Spans are only meaningful for trees read from
//! text.

use std::fmt;

use pest::Parser as _;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{
    syntax::{FromSyntax, Node, Parser, Rule},
    Error, Span,
};

pub fn parse(input: &str) -> Result<Module, Vec<Error>> {
    let mut pairs = Parser::parse(Rule::module, input).map_err(|err| vec![err.into()])?;
    let Some(pair) = pairs.next() else {
        unreachable!("`module` always produces a pair")
    };
    debug_assert_eq!(pair.as_rule(), Rule::module);

    let mut node = Node::new(pair);
    let module = Module::from_syntax(&mut node);
    if node.errors.is_empty() {
        Ok(module)
    } else {
        Err(node.errors)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: Name,
    #[serde(default)]
    pub globals: Vec<Global>,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
    #[serde(default)]
    pub functions: Vec<Func>,
}

impl FromSyntax<Error> for Module {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Module {
            name: node.descend_into(Rule::module_header, |n| n.single(Rule::ident)),
            globals: node.multi(Rule::global),
            declarations: node.multi(Rule::declaration),
            functions: node.multi(Rule::function),
        }
    }
}

/// An identifier with the place it was written at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SmolStr", into = "SmolStr")]
pub struct Name {
    pub text: SmolStr,
    pub span: Span,
}

impl Name {
    pub fn new(text: impl Into<SmolStr>) -> Self {
        Self {
            text: text.into(),
            span: Span::default(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl From<SmolStr> for Name {
    fn from(text: SmolStr) -> Self {
        Self::new(text)
    }
}

impl From<Name> for SmolStr {
    fn from(name: Name) -> Self {
        name.text
    }
}

impl FromSyntax<Error> for Name {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Name {
            text: node.txt.into(),
            span: node.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeName {
    Scalar(Name),
    Array(Box<TypeName>, usize),
}

impl TypeName {
    pub fn span(&self) -> Span {
        match self {
            Self::Scalar(name) => name.span,
            Self::Array(elem, _) => elem.span(),
        }
    }
}

impl FromSyntax<Error> for TypeName {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        if let Some(name) = node.single_opt(Rule::scalar_type) {
            return TypeName::Scalar(name);
        }

        node.descend_into(Rule::array_type, |n| {
            let elem = n.single(Rule::type_name);
            let (len, span) = n.spanned_str_of(Rule::decimal);
            let len = len.parse().unwrap_or_else(|_| {
                n.error(Error::NumberOutOfBounds(span));
                0
            });
            TypeName::Array(Box::new(elem), len)
        })
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Scalar(name) => f.write_str(name.as_str()),
            Self::Array(elem, len) => write!(f, "[{elem}; {len}]"),
        }
    }
}

impl From<TypeName> for String {
    fn from(ty: TypeName) -> Self {
        ty.to_string()
    }
}

impl TryFrom<String> for TypeName {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let mut pairs =
            Parser::parse(Rule::standalone_type, &s).map_err(|err| err.to_string())?;
        let Some(pair) = pairs.next() else {
            return Err(format!("`{s}` is not a type"));
        };

        let mut node = Node::new(pair);
        let ty: TypeName = node.single(Rule::type_name);
        match node.errors.first() {
            Some(err) => Err(err.to_string()),
            None => Ok(ty.without_span()),
        }
    }
}

impl TypeName {
    fn without_span(self) -> Self {
        match self {
            Self::Scalar(name) => Self::Scalar(Name::new(name.text)),
            Self::Array(elem, len) => Self::Array(Box::new(elem.without_span()), len),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub name: Name,
    pub ty: TypeName,
    /// Hex encoded initial bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<Name>,
}

impl FromSyntax<Error> for Global {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Global {
            name: node.descend_into(Rule::global_name, |n| n.single(Rule::ident)),
            ty: node.single(Rule::type_name),
            init: node.single_opt::<Name>(Rule::hex_bytes).map(|mut bytes| {
                bytes.text = bytes.text.trim_start_matches("0x").into();
                bytes
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub name: Name,
    pub params: Vec<TypeName>,
    pub ret_ty: TypeName,
}

impl FromSyntax<Error> for Declaration {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Declaration {
            name: node.descend_into(Rule::func_name, |n| n.single(Rule::ident)),
            params: node.descend_into(Rule::type_list, |n| n.multi(Rule::type_name)),
            ret_ty: node.single(Rule::type_name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Func {
    pub name: Name,
    pub params: Vec<ValueDecl>,
    pub ret_ty: TypeName,
    pub blocks: Vec<BlockDef>,
}

impl FromSyntax<Error> for Func {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Func {
            name: node.descend_into(Rule::func_name, |n| n.single(Rule::ident)),
            params: node.descend_into(Rule::param_list, |n| n.multi(Rule::value_decl)),
            ret_ty: node.single(Rule::type_name),
            blocks: node.multi(Rule::block),
        }
    }
}

/// `name.ty`, a parameter or an instruction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueDecl {
    pub name: Name,
    pub ty: TypeName,
}

impl FromSyntax<Error> for ValueDecl {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        ValueDecl {
            name: node.single(Rule::ident),
            ty: TypeName::Scalar(node.single(Rule::scalar_type)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDef {
    pub label: Name,
    pub stmts: Vec<Stmt>,
}

impl FromSyntax<Error> for BlockDef {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        BlockDef {
            label: node.single(Rule::block_label),
            stmts: node.multi(Rule::stmt),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ValueDecl>,
    #[serde(flatten)]
    pub expr: Expr,
    #[serde(skip)]
    pub span: Span,
}

impl FromSyntax<Error> for Stmt {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        let span = node.span;
        let result = node.single_opt(Rule::value_decl);
        let Some(expr) = node.descend_into_next(Expr::from_syntax) else {
            unreachable!("a statement always holds an expression")
        };
        Stmt { result, expr, span }
    }
}

/// `(value block)` entry of a phi.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhiArg(pub Name, pub Name);

impl FromSyntax<Error> for PhiArg {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        PhiArg(node.single(Rule::value_ref), node.single(Rule::block_ref))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    Const {
        literal: Name,
    },
    Undef,
    Unary {
        code: Name,
        arg: Name,
    },
    Binary {
        code: Name,
        lhs: Name,
        rhs: Name,
    },
    Cast {
        arg: Name,
    },
    Load {
        addr: Name,
    },
    Store {
        addr: Name,
        value: Name,
    },
    Alloc {
        ty: TypeName,
    },
    GlobalAddr {
        global: Name,
    },
    Call {
        callee: Name,
        args: Vec<Name>,
    },
    Phi {
        args: Vec<PhiArg>,
    },
    Jump {
        dest: Name,
    },
    Branch {
        cond: Name,
        lhs: Name,
        rhs: Name,
        then: Name,
        #[serde(rename = "else")]
        else_: Name,
    },
    Return {
        arg: Name,
    },
    Exit,
}

impl Expr {
    /// The mnemonic of the expression in the text form.
    pub fn opcode(&self) -> &str {
        match self {
            Self::Const { .. } => "const",
            Self::Undef => "undef",
            Self::Unary { code, .. } | Self::Binary { code, .. } => code.as_str(),
            Self::Cast { .. } => "cast",
            Self::Load { .. } => "load",
            Self::Store { .. } => "store",
            Self::Alloc { .. } => "alloc",
            Self::GlobalAddr { .. } => "gaddr",
            Self::Call { .. } => "call",
            Self::Phi { .. } => "phi",
            Self::Jump { .. } => "jump",
            Self::Branch { .. } => "br",
            Self::Return { .. } => "return",
            Self::Exit => "exit",
        }
    }
}

impl FromSyntax<Error> for Expr {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        match node.rule {
            Rule::const_expr => Expr::Const {
                literal: node.single(Rule::literal),
            },
            Rule::undef_expr => Expr::Undef,
            Rule::unary_expr => Expr::Unary {
                code: node.single(Rule::unary_op),
                arg: node.single(Rule::value_ref),
            },
            Rule::binary_expr => Expr::Binary {
                code: node.single(Rule::binary_op),
                lhs: node.single(Rule::value_ref),
                rhs: node.single(Rule::value_ref),
            },
            Rule::cast_expr => Expr::Cast {
                arg: node.single(Rule::value_ref),
            },
            Rule::load_expr => Expr::Load {
                addr: node.single(Rule::value_ref),
            },
            Rule::store_expr => Expr::Store {
                addr: node.single(Rule::value_ref),
                value: node.single(Rule::value_ref),
            },
            Rule::alloc_expr => Expr::Alloc {
                ty: node.single(Rule::type_name),
            },
            Rule::gaddr_expr => Expr::GlobalAddr {
                global: node.descend_into(Rule::global_name, |n| n.single(Rule::ident)),
            },
            Rule::call_expr => Expr::Call {
                callee: node.descend_into(Rule::func_name, |n| n.single(Rule::ident)),
                args: node.multi(Rule::value_ref),
            },
            Rule::phi_expr => Expr::Phi {
                args: node.multi(Rule::phi_arg),
            },
            Rule::jump_expr => Expr::Jump {
                dest: node.single(Rule::block_ref),
            },
            Rule::br_expr => Expr::Branch {
                cond: node.single(Rule::cmp_op),
                lhs: node.single(Rule::value_ref),
                rhs: node.single(Rule::value_ref),
                then: node.single(Rule::block_ref),
                else_: node.single(Rule::block_ref),
            },
            Rule::return_expr => Expr::Return {
                arg: node.single(Rule::value_ref),
            },
            Rule::exit_expr => Expr::Exit,
            rule => unreachable!("{rule:?} is not an expression"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        let ty = TypeName::try_from("[[u8; 4]; 2]".to_string()).unwrap();
        assert_eq!(ty.to_string(), "[[u8; 4]; 2]");
        assert!(matches!(&ty, TypeName::Array(_, 2)));
        assert!(TypeName::try_from("[u8 4]".to_string()).is_err());
        assert!(TypeName::try_from("[u8; 99999999999999999999999]".to_string()).is_err());
    }

    #[test]
    fn statements_keep_operand_order() {
        let module = parse(
            "module m;
func %f(a.i32, b.i32) -> void {
    entry:
        d.i32 = sub b a;
        br lt a d entry exit_;

    exit_:
        exit;
}
",
        )
        .unwrap();

        let func = &module.functions[0];
        assert_eq!(func.params.len(), 2);
        let stmts = &func.blocks[0].stmts;
        match &stmts[0].expr {
            Expr::Binary { code, lhs, rhs } => {
                assert_eq!(code.as_str(), "sub");
                assert_eq!((lhs.as_str(), rhs.as_str()), ("b", "a"));
            }
            expr => panic!("unexpected {expr:?}"),
        }
        match &stmts[1].expr {
            Expr::Branch { then, else_, .. } => {
                assert_eq!((then.as_str(), else_.as_str()), ("entry", "exit_"));
            }
            expr => panic!("unexpected {expr:?}"),
        }
        assert_eq!(func.blocks[1].label.as_str(), "exit_");
        assert!(matches!(func.blocks[1].stmts[0].expr, Expr::Exit));
    }

    #[test]
    fn syntax_error_has_a_span() {
        let errs = parse("module m;\nfunc %f() -> void {\n    b0:\n        exit\n}\n").unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0], Error::Syntax { .. }));
        assert!(errs[0].span().is_some());
    }
}
