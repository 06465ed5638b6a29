use super::{PResult, Parser};
use crate::ast::*;
use crate::error::ParseErrorKind;
use crate::lexer::{Token, TokenKind};

impl Parser<'_> {
    /// Pipeline:
    ///     declarations? command ("|" command)*
    ///
    /// Consumes the closing right delimiter.
    pub(super) fn pipeline(&mut self, context: &str) -> PResult<PipeNode> {
        let start = self.peek_span()?;
        let decl = self.declarations(context)?;

        if self.peek_kind()? == TokenKind::RightDelim {
            let token = self.next()?;
            return Err(self.error(
                token.span,
                ParseErrorKind::MissingValue(context.to_string()),
            ));
        }

        let mut cmds = Vec::new();
        loop {
            let (cmd, piped) = self.command(context)?;
            cmds.push(cmd);
            if !piped {
                break;
            }
        }
        let close = self.expect(TokenKind::RightDelim, context)?;
        Ok(PipeNode { span: start.merge(&close.span), decl, cmds })
    }

    /// `$x :=` anywhere, `$x, $y :=` only in a range.
    fn declarations(&mut self, context: &str) -> PResult<Vec<VariableNode>> {
        let mut decl = Vec::new();
        let first = self.next()?;
        if first.kind != TokenKind::Variable {
            self.backup(first);
            return Ok(decl);
        }
        let op = self.next()?;
        match op.kind {
            TokenKind::ColonAssign => {
                self.declare(&first, &mut decl)?;
            }
            TokenKind::Comma => {
                self.declare(&first, &mut decl)?;
                if context != "range" {
                    return Err(self.error(
                        op.span,
                        ParseErrorKind::TooManyDeclarations(context.to_string()),
                    ));
                }
                let second = self.expect(TokenKind::Variable, context)?;
                self.declare(&second, &mut decl)?;
                let op = self.next()?;
                match op.kind {
                    TokenKind::ColonAssign => {}
                    TokenKind::Comma => {
                        return Err(self.error(
                            op.span,
                            ParseErrorKind::TooManyDeclarations(context.to_string()),
                        ));
                    }
                    _ => return Err(self.unexpected(&op, context)),
                }
            }
            _ => self.backup2(first, op),
        }
        Ok(decl)
    }

    fn declare(&mut self, token: &Token, decl: &mut Vec<VariableNode>) -> PResult<()> {
        let variable = VariableNode::new(&token.value, token.span);
        if variable.ident.len() != 1 {
            return Err(self.error(
                token.span,
                ParseErrorKind::IllegalDeclaration(token.value.clone()),
            ));
        }
        self.vars.push(variable.name().to_string());
        decl.push(variable);
        Ok(())
    }

    /// Space-separated operands up to a `|` or the right delimiter. The pipe is
    /// consumed and reported; the delimiter is left for the caller.
    fn command(&mut self, context: &str) -> PResult<(CommandNode, bool)> {
        let start = self.peek_span()?;
        let mut args = Vec::new();
        let mut piped = false;
        let mut end = start;
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::Pipe => {
                    piped = true;
                    break;
                }
                TokenKind::RightDelim => {
                    self.backup(token);
                    break;
                }
                TokenKind::Eof => return Err(self.unexpected(&token, context)),
                _ => {
                    end = token.span;
                    args.push(self.operand(token)?);
                }
            }
        }
        if args.is_empty() {
            return Err(self.error(start, ParseErrorKind::EmptyCommand));
        }
        Ok((CommandNode { span: start.merge(&end), args }, piped))
    }

    fn operand(&mut self, token: Token) -> PResult<Arg> {
        let span = token.span;
        let arg = match token.kind {
            TokenKind::Identifier => {
                if !self.has_function(&token.value) {
                    return Err(self.error(span, ParseErrorKind::UndefinedFunction(token.value)));
                }
                Arg::Identifier(IdentifierNode::new(token.value, span))
            }
            TokenKind::Variable => Arg::Variable(self.use_var(&token)?),
            TokenKind::Field => Arg::Field(FieldNode::new(&token.value, span)),
            TokenKind::Dot => Arg::Dot(span),
            TokenKind::Nil => Arg::Nil(span),
            TokenKind::Bool => Arg::Bool(BoolNode { span, value: token.value == "true" }),
            TokenKind::Int | TokenKind::Float => match NumberNode::parse(&token.value, span) {
                Some(number) => Arg::Number(number),
                None => return Err(self.error(span, ParseErrorKind::InvalidNumber(token.value))),
            },
            TokenKind::CharConstant => {
                let mut chars = unquote(&token.value).unwrap_or_default().chars().collect::<Vec<_>>();
                match (chars.pop(), chars.is_empty()) {
                    (Some(c), true) => Arg::Number(NumberNode::from_char(c, &token.value, span)),
                    _ => {
                        return Err(self.error(span, ParseErrorKind::InvalidNumber(token.value)));
                    }
                }
            }
            TokenKind::String | TokenKind::RawString => match unquote(&token.value) {
                Some(text) => Arg::String(StringNode { span, quoted: token.value, text }),
                None => return Err(self.error(span, ParseErrorKind::InvalidString(token.value))),
            },
            _ => return Err(self.unexpected(&token, "command")),
        };
        Ok(arg)
    }

    /// Resolves a variable reference against the names in scope.
    fn use_var(&self, token: &Token) -> PResult<VariableNode> {
        let variable = VariableNode::new(&token.value, token.span);
        if self.vars.iter().any(|name| name == variable.name()) {
            Ok(variable)
        } else {
            Err(self.error(
                token.span,
                ParseErrorKind::UndefinedVariable(variable.name().to_string()),
            ))
        }
    }
}
