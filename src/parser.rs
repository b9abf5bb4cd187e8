//! Recursive-descent parser: one function per grammar alternative, as
//! spec.md's front-end interface (§4.2, §6) describes. Produces the owned
//! AST in `crate::ast`.

use crate::ast::*;
use crate::lexer::{Lexer, Tok, Token};
use crate::span::FileSpan;
use crate::symbol::Symbol;

#[derive(Debug, thiserror::Error)]
#[error("parse error at {span:?}: expected {expected}, found {found:?}")]
pub struct ParseError {
    pub span: FileSpan,
    pub expected: String,
    pub found: Tok,
}

pub struct Parser {
    toks: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    #[must_use] pub fn new(toks: Vec<Token>) -> Self { Self { toks, pos: 0 } }

    fn cur(&self) -> &Token { &self.toks[self.pos] }
    fn cur_span(&self) -> FileSpan { self.cur().span.clone() }

    fn bump(&mut self) -> Token {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() { self.pos += 1; }
        t
    }

    fn expect(&mut self, tok: Tok, what: &str) -> PResult<Token> {
        if self.cur().tok == tok {
            Ok(self.bump())
        } else {
            Err(ParseError { span: self.cur_span(), expected: what.into(), found: self.cur().tok.clone() })
        }
    }

    fn expect_ident(&mut self) -> PResult<(Symbol, FileSpan)> {
        let t = self.cur().clone();
        if let Tok::Ident(s) = t.tok {
            self.bump();
            Ok((s, t.span))
        } else {
            Err(ParseError { span: t.span, expected: "identifier".into(), found: t.tok })
        }
    }

    /// `System.out.println` is recognized by name, since MiniJava has no
    /// general static-member syntax.
    fn eat_ident_text(&mut self, text: &str) -> PResult<()> {
        let (s, span) = self.expect_ident()?;
        if &*s.as_str() != text {
            return Err(ParseError { span, expected: format!("`{text}`"), found: Tok::Ident(s) });
        }
        Ok(())
    }

    pub fn parse_program(&mut self) -> PResult<Program> {
        let main = self.parse_main_class()?;
        let mut classes = Vec::new();
        while self.cur().tok != Tok::Eof {
            classes.push(self.parse_class_decl()?);
        }
        Ok(Program { main, classes })
    }

    fn parse_main_class(&mut self) -> PResult<MainClass> {
        self.expect(Tok::Class, "`class`")?;
        let (name, span) = self.expect_ident()?;
        self.expect(Tok::LBrace, "`{`")?;
        self.expect(Tok::Public, "`public`")?;
        self.expect(Tok::Static, "`static`")?;
        self.expect(Tok::Void, "`void`")?;
        self.expect(Tok::Main, "`main`")?;
        self.expect(Tok::LParen, "`(`")?;
        self.expect(Tok::String, "`String`")?;
        self.expect(Tok::LBracket, "`[`")?;
        self.expect(Tok::RBracket, "`]`")?;
        let (arg_name, _) = self.expect_ident()?;
        self.expect(Tok::RParen, "`)`")?;
        self.expect(Tok::LBrace, "`{`")?;
        let body = self.parse_statement()?;
        self.expect(Tok::RBrace, "`}`")?;
        self.expect(Tok::RBrace, "`}`")?;
        Ok(MainClass { name: crate::span::Spanned::new(span, name), arg_name, body })
    }

    fn parse_class_decl(&mut self) -> PResult<ClassDecl> {
        self.expect(Tok::Class, "`class`")?;
        let (name, span) = self.expect_ident()?;
        let superclass = if self.cur().tok == Tok::Extends {
            self.bump();
            let (sup, sup_span) = self.expect_ident()?;
            Some(crate::span::Spanned::new(sup_span, sup))
        } else {
            None
        };
        self.expect(Tok::LBrace, "`{`")?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        loop {
            match self.cur().tok {
                Tok::Public => methods.push(self.parse_method_decl()?),
                Tok::RBrace => break,
                _ => fields.push(self.parse_var_decl()?),
            }
        }
        self.expect(Tok::RBrace, "`}`")?;
        Ok(ClassDecl { name: crate::span::Spanned::new(span, name), superclass, fields, methods })
    }

    fn parse_type(&mut self) -> PResult<TypeNode> {
        match self.cur().tok.clone() {
            Tok::Int => {
                self.bump();
                if self.cur().tok == Tok::LBracket {
                    self.bump();
                    self.expect(Tok::RBracket, "`]`")?;
                    Ok(TypeNode::IntArray)
                } else {
                    Ok(TypeNode::Int)
                }
            }
            Tok::Boolean => { self.bump(); Ok(TypeNode::Boolean) }
            Tok::Ident(_) => {
                let (s, span) = self.expect_ident()?;
                Ok(TypeNode::ClassName(crate::span::Spanned::new(span, s)))
            }
            other => Err(ParseError { span: self.cur_span(), expected: "a type".into(), found: other }),
        }
    }

    fn parse_var_decl(&mut self) -> PResult<VarDecl> {
        let ty = self.parse_type()?;
        let (name, span) = self.expect_ident()?;
        self.expect(Tok::Semi, "`;`")?;
        Ok(VarDecl { name: crate::span::Spanned::new(span, name), ty })
    }

    fn parse_method_decl(&mut self) -> PResult<MethodDecl> {
        let start = self.cur_span();
        self.expect(Tok::Public, "`public`")?;
        let ret_ty = self.parse_type()?;
        let (name, span) = self.expect_ident()?;
        self.expect(Tok::LParen, "`(`")?;
        let mut params = Vec::new();
        if self.cur().tok != Tok::RParen {
            loop {
                let ty = self.parse_type()?;
                let (pname, pspan) = self.expect_ident()?;
                params.push(VarDecl { name: crate::span::Spanned::new(pspan, pname), ty });
                if self.cur().tok == Tok::Comma { self.bump(); } else { break; }
            }
        }
        self.expect(Tok::RParen, "`)`")?;
        self.expect(Tok::LBrace, "`{`")?;
        let mut locals = Vec::new();
        while self.starts_var_decl() {
            locals.push(self.parse_var_decl()?);
        }
        let mut body = Vec::new();
        while self.cur().tok != Tok::Return {
            body.push(self.parse_statement()?);
        }
        self.expect(Tok::Return, "`return`")?;
        let ret_expr = self.parse_expr()?;
        self.expect(Tok::Semi, "`;`")?;
        let end = self.cur_span();
        self.expect(Tok::RBrace, "`}`")?;
        Ok(MethodDecl {
            name: crate::span::Spanned::new(span, name),
            params,
            locals,
            body,
            ret_expr,
            ret_ty,
            span: start.to(&end),
        })
    }

    /// Disambiguates a leading local-variable declaration (`Type id;`) from
    /// the start of a statement, which can also begin with an identifier
    /// (`id = e;`). A declaration is followed directly by another
    /// identifier before any operator.
    fn starts_var_decl(&self) -> bool {
        match &self.toks[self.pos].tok {
            Tok::Int | Tok::Boolean => true,
            Tok::Ident(_) => matches!(self.toks.get(self.pos + 1).map(|t| &t.tok), Some(Tok::Ident(_))),
            _ => false,
        }
    }

    fn parse_statement(&mut self) -> PResult<Statement> {
        match self.cur().tok.clone() {
            Tok::LBrace => {
                self.bump();
                let mut stmts = Vec::new();
                while self.cur().tok != Tok::RBrace { stmts.push(self.parse_statement()?); }
                self.bump();
                Ok(Statement::Block(stmts))
            }
            Tok::If => {
                self.bump();
                self.expect(Tok::LParen, "`(`")?;
                let cond = self.parse_expr()?;
                self.expect(Tok::RParen, "`)`")?;
                let then_branch = Box::new(self.parse_statement()?);
                self.expect(Tok::Else, "`else`")?;
                let else_branch = Box::new(self.parse_statement()?);
                Ok(Statement::If { cond, then_branch, else_branch })
            }
            Tok::While => {
                self.bump();
                self.expect(Tok::LParen, "`(`")?;
                let cond = self.parse_expr()?;
                self.expect(Tok::RParen, "`)`")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Statement::While { cond, body })
            }
            Tok::Do => {
                self.bump();
                let body = Box::new(self.parse_statement()?);
                self.expect(Tok::While, "`while`")?;
                self.expect(Tok::LParen, "`(`")?;
                let cond = self.parse_expr()?;
                self.expect(Tok::RParen, "`)`")?;
                self.expect(Tok::Semi, "`;`")?;
                Ok(Statement::DoWhile { body, cond })
            }
            Tok::Ident(s) if &*s.as_str() == "System" => {
                self.bump();
                self.expect(Tok::Dot, "`.`")?;
                self.eat_ident_text("out")?;
                self.expect(Tok::Dot, "`.`")?;
                self.eat_ident_text("println")?;
                self.expect(Tok::LParen, "`(`")?;
                let e = self.parse_expr()?;
                self.expect(Tok::RParen, "`)`")?;
                self.expect(Tok::Semi, "`;`")?;
                Ok(Statement::Println(e))
            }
            Tok::Ident(_) => {
                let (name, span) = self.expect_ident()?;
                if self.cur().tok == Tok::LBracket {
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(Tok::RBracket, "`]`")?;
                    self.expect(Tok::Assign, "`=`")?;
                    let value = self.parse_expr()?;
                    self.expect(Tok::Semi, "`;`")?;
                    Ok(Statement::ArrayAssign { name: crate::span::Spanned::new(span, name), index, value })
                } else {
                    self.expect(Tok::Assign, "`=`")?;
                    let value = self.parse_expr()?;
                    self.expect(Tok::Semi, "`;`")?;
                    Ok(Statement::Assign { name: crate::span::Spanned::new(span, name), value })
                }
            }
            other => Err(ParseError { span: self.cur_span(), expected: "a statement".into(), found: other }),
        }
    }

    // Expression grammar, loosest to tightest:
    //   and < lt < add/sub < mul < unary < postfix < primary

    fn parse_expr(&mut self) -> PResult<Expr> { self.parse_and() }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_lt()?;
        while self.cur().tok == Tok::And {
            self.bump();
            let rhs = self.parse_lt()?;
            let span = lhs.span.to(&rhs.span);
            lhs = Expr::new(span, ExprKind::And(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_lt(&mut self) -> PResult<Expr> {
        let lhs = self.parse_add()?;
        if self.cur().tok == Tok::Lt {
            self.bump();
            let rhs = self.parse_add()?;
            let span = lhs.span.to(&rhs.span);
            return Ok(Expr::new(span, ExprKind::Lt(Box::new(lhs), Box::new(rhs))));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            match self.cur().tok {
                Tok::Plus => {
                    self.bump();
                    let rhs = self.parse_mul()?;
                    let span = lhs.span.to(&rhs.span);
                    lhs = Expr::new(span, ExprKind::Add(Box::new(lhs), Box::new(rhs)));
                }
                Tok::Minus => {
                    self.bump();
                    let rhs = self.parse_mul()?;
                    let span = lhs.span.to(&rhs.span);
                    lhs = Expr::new(span, ExprKind::Sub(Box::new(lhs), Box::new(rhs)));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        while self.cur().tok == Tok::Star {
            self.bump();
            let rhs = self.parse_unary()?;
            let span = lhs.span.to(&rhs.span);
            lhs = Expr::new(span, ExprKind::Mul(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.cur().tok == Tok::Bang {
            let span = self.cur_span();
            self.bump();
            let e = self.parse_unary()?;
            let span = span.to(&e.span);
            return Ok(Expr::new(span, ExprKind::Not(Box::new(e))));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut e = self.parse_primary()?;
        loop {
            match self.cur().tok.clone() {
                Tok::Dot => {
                    self.bump();
                    if self.cur().tok == Tok::Length {
                        let end = self.cur_span();
                        self.bump();
                        let span = e.span.to(&end);
                        e = Expr::new(span, ExprKind::Length(Box::new(e)));
                    } else {
                        let (m, mspan) = self.expect_ident()?;
                        self.expect(Tok::LParen, "`(`")?;
                        let mut args = Vec::new();
                        if self.cur().tok != Tok::RParen {
                            loop {
                                args.push(self.parse_expr()?);
                                if self.cur().tok == Tok::Comma { self.bump(); } else { break; }
                            }
                        }
                        let end = self.cur_span();
                        self.expect(Tok::RParen, "`)`")?;
                        let span = e.span.to(&end);
                        e = Expr::new(
                            span,
                            ExprKind::Call { receiver: Box::new(e), method: crate::span::Spanned::new(mspan, m), args },
                        );
                    }
                }
                Tok::LBracket => {
                    self.bump();
                    let idx = self.parse_expr()?;
                    let end = self.cur_span();
                    self.expect(Tok::RBracket, "`]`")?;
                    let span = e.span.to(&end);
                    e = Expr::new(span, ExprKind::Index { array: Box::new(e), index: Box::new(idx) });
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let start = self.cur_span();
        match self.cur().tok.clone() {
            Tok::IntLit(n) => { self.bump(); Ok(Expr::new(start, ExprKind::IntLit(n))) }
            Tok::True => { self.bump(); Ok(Expr::new(start, ExprKind::True)) }
            Tok::False => { self.bump(); Ok(Expr::new(start, ExprKind::False)) }
            Tok::This => { self.bump(); Ok(Expr::new(start, ExprKind::This)) }
            Tok::Ident(s) => { self.bump(); Ok(Expr::new(start, ExprKind::Identifier(s))) }
            Tok::LParen => {
                self.bump();
                let e = self.parse_expr()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(e)
            }
            Tok::New => {
                self.bump();
                if self.cur().tok == Tok::Int {
                    self.bump();
                    self.expect(Tok::LBracket, "`[`")?;
                    let n = self.parse_expr()?;
                    let end = self.cur_span();
                    self.expect(Tok::RBracket, "`]`")?;
                    let span = start.to(&end);
                    Ok(Expr::new(span, ExprKind::NewIntArray(Box::new(n))))
                } else {
                    let (name, nspan) = self.expect_ident()?;
                    self.expect(Tok::LParen, "`(`")?;
                    let end = self.cur_span();
                    self.expect(Tok::RParen, "`)`")?;
                    let span = start.to(&end);
                    Ok(Expr::new(span, ExprKind::NewObject(crate::span::Spanned::new(nspan, name))))
                }
            }
            other => Err(ParseError { span: start, expected: "an expression".into(), found: other }),
        }
    }
}

/// Lex and parse a whole file into a `Program`.
pub fn parse(file: std::rc::Rc<str>, src: &str) -> Result<Program, ParseFront> {
    let toks = crate::lexer::Lexer::new(file, src).tokenize().map_err(ParseFront::Lex)?;
    let mut p = Parser::new(toks);
    p.parse_program().map_err(ParseFront::Parse)
}

#[derive(Debug, thiserror::Error)]
pub enum ParseFront {
    #[error(transparent)]
    Lex(#[from] crate::lexer::LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        parse(std::rc::Rc::from("t.java"), src).expect("parses")
    }

    #[test]
    fn minimal_main_class() {
        let p = parse_ok("class M { public static void main(String[] a) { System.out.println(1); } }");
        assert_eq!(&*p.main.name.k.as_str(), "M");
        assert!(p.classes.is_empty());
    }

    #[test]
    fn auxiliary_class_with_field_and_method() {
        let p = parse_ok(
            "class M { public static void main(String[] a) { } }\n\
             class A { int x; public int get() { return x; } }",
        );
        assert_eq!(p.classes.len(), 1);
        assert_eq!(p.classes[0].fields.len(), 1);
        assert_eq!(p.classes[0].methods.len(), 1);
    }

    #[test]
    fn extends_clause_is_recorded() {
        let p = parse_ok(
            "class M { public static void main(String[] a) { } }\n\
             class A { }\nclass B extends A { }",
        );
        let b = &p.classes[1];
        assert_eq!(&*b.superclass.as_ref().unwrap().k.as_str(), "A");
    }

    #[test]
    fn expression_precedence_nests_mul_inside_add() {
        let p = parse_ok("class M { public static void main(String[] a) { System.out.println(1+2*3); } }");
        let Statement::Println(e) = &p.main.body else { panic!("expected println") };
        assert!(matches!(e.kind, ExprKind::Add(_, _)));
        let ExprKind::Add(_, rhs) = &e.kind else { unreachable!() };
        assert!(matches!(rhs.kind, ExprKind::Mul(_, _)));
    }

    #[test]
    fn postfix_chains_call_then_length() {
        let p = parse_ok(
            "class M { public static void main(String[] a) { System.out.println(new A().make().length); } }\n\
             class A { public int[] make() { return new int[1]; } }",
        );
        let Statement::Println(e) = &p.main.body else { panic!("expected println") };
        assert!(matches!(e.kind, ExprKind::Length(_)));
    }

    #[test]
    fn missing_semicolon_is_a_parse_error() {
        let err = parse(
            std::rc::Rc::from("t.java"),
            "class M { public static void main(String[] a) { System.out.println(1) } }",
        ).unwrap_err();
        assert!(matches!(err, ParseFront::Parse(_)));
    }

    #[test]
    fn local_declaration_disambiguated_from_assignment() {
        let p = parse_ok(
            "class M { public static void main(String[] a) { } }\n\
             class A { public int run() { int x; x = 1; return x; } }",
        );
        let m = &p.classes[0].methods[0];
        assert_eq!(m.locals.len(), 1);
        assert_eq!(m.body.len(), 1);
    }

    #[test]
    fn array_assignment_statement() {
        let p = parse_ok(
            "class M { public static void main(String[] a) { } }\n\
             class A { public int run() { int[] xs; xs = new int[2]; xs[0] = 9; return xs[0]; } }",
        );
        let m = &p.classes[0].methods[0];
        assert!(matches!(m.body[1], Statement::ArrayAssign { .. }));
    }
}
