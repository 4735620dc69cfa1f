use tracing::{debug, trace, warn};

use crate::bytecode::assemble::assemble;
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::context::{Access, Context};
use crate::bytecode::emit;
use crate::bytecode::ir::CodeObject;
use crate::bytecode::words::{Action, DefaultAction, WordTable};
use crate::lexer::{Lexer, Span, Spanned};

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Number of leading local slots bound to call arguments.
    pub argcount: usize,
    /// Code object name when the source has no `: name`.
    pub name: String,
    pub filename: String,
    /// Line number of the first source line.
    pub first_line: usize,
    /// Single-character words that start a line comment.
    pub line_comments: Vec<char>,
    /// Append `RETURN_VALUE` when the code does not end with one.
    pub implicit_return: bool,
    /// Compute the stack size and reject code that underflows.
    pub check_stack: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            argcount: 0,
            name: "<forth>".to_string(),
            filename: "<string>".to_string(),
            first_line: 1,
            line_comments: vec!['\\', '#'],
            implicit_return: true,
            check_stack: true,
        }
    }
}

impl CompilerConfig {
    pub fn with_argcount(mut self, argcount: usize) -> Self {
        self.argcount = argcount;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_first_line(mut self, first_line: usize) -> Self {
        self.first_line = first_line;
        self
    }

    pub fn with_line_comments(mut self, line_comments: &[char]) -> Self {
        self.line_comments = line_comments.to_vec();
        self
    }

    pub fn with_implicit_return(mut self, implicit_return: bool) -> Self {
        self.implicit_return = implicit_return;
        self
    }

    pub fn with_check_stack(mut self, check_stack: bool) -> Self {
        self.check_stack = check_stack;
        self
    }
}

/// Compiles stack-language source into code objects.
///
/// A `Compiler` holds only configuration and the word table; every call to
/// [`Compiler::compile`] works on its own [`Context`].
pub struct Compiler {
    config: CompilerConfig,
    words: WordTable,
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Compiler {
            config,
            words: WordTable::standard(),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile(&self, source: &str) -> Result<CodeObject, CompileError> {
        let ctx = self.compile_context(source)?;
        assemble(ctx, &self.config)
    }

    /// Run every word through its emitter and check that nothing is left
    /// open, without assembling.
    pub fn compile_context(&self, source: &str) -> Result<Context, CompileError> {
        let mut ctx = Context::new();
        let mut lexer = Lexer::with_comments(source, &self.config.line_comments);
        let mut line = 0;

        while let Some(Spanned { word, span }) = lexer.next() {
            while line < span.line {
                ctx.mark_line(line);
                line += 1;
            }
            self.compile_word(&mut ctx, word, span)?;
        }
        while line < lexer.line_count() {
            ctx.mark_line(line);
            line += 1;
        }

        finish(&ctx)?;

        debug!(
            lines = line,
            bytes = ctx.here(),
            consts = ctx.consts().len(),
            locals = ctx.locals().len(),
            "compiled source"
        );
        Ok(ctx)
    }

    fn compile_word(&self, ctx: &mut Context, word: &str, span: Span) -> Result<(), CompileError> {
        trace!(word, line = span.display_line(), offset = ctx.here(), "compile word");

        match ctx.default_action() {
            DefaultAction::DeclareLocal if word != "}" && word != "{" => {
                if !ctx.skip_outputs && self.words.contains(word) {
                    warn!(
                        word,
                        line = span.display_line(),
                        "local shadows a built-in word"
                    );
                }
                return emit::declare_local(ctx, word, span);
            }
            DefaultAction::DefineName => return emit::define_name(ctx, word, span),
            _ => {}
        }

        if let Some(slot) = ctx.locals().slot(word) {
            return emit::emit_reference(ctx, slot, word, span);
        }

        match self.words.get(word) {
            Some(Action::Template(ops)) => emit::emit_template(ctx, ops, word, span),
            Some(Action::Compare(cmp)) => emit::emit_compare(ctx, cmp, word, span),
            Some(Action::Emit(emitter)) => emit::run(ctx, emitter, word, span),
            None => emit::emit_literal(ctx, word, span),
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// End of input: every block, region and `to` must be closed.
fn finish(ctx: &Context) -> Result<(), CompileError> {
    match ctx.default_action() {
        DefaultAction::DeclareLocal => {
            return Err(CompileError::unclosed("{", ctx.mode_span.unwrap_or_default()));
        }
        DefaultAction::DefineName => {
            return Err(CompileError::unclosed(":", ctx.mode_span.unwrap_or_default()));
        }
        DefaultAction::EmitLiteral => {}
    }

    if let Some(block) = ctx.blocks().last() {
        return Err(CompileError::unclosed(block.opened_by(), block.span()));
    }

    if ctx.access() == Access::Store {
        return Err(CompileError::unclosed("to", ctx.store_span.unwrap_or_default()));
    }

    Ok(())
}
