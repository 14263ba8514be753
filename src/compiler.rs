//! Single-pass Pratt parser that emits directly into the in-progress
//! function's chunk (spec.md §4.5). A `Vec<Compiler>` stands in for the
//! recursive-descent "compiler chain" of nested function bodies; each
//! `Compiler` owns the `ObjectFunction` it is building plus its own
//! locals/upvalues/loop bookkeeping. `Parser` is the outer driver: token
//! stream, error flags, the class-compiler stack (for `this`/`super`), and
//! the global-mutability table `final` bindings are checked against.

use crate::{
    chunk::{Chunk, OpCode},
    constants::STACK_SLOTS_PER_FRAME,
    objects::{object_function::ObjectFunction, object_manager::ObjectManager},
    scanner::{Scanner, Token, TokenType},
    table::Table,
    value::{make_bool_value, make_function_value, make_numer_value, make_string_value, Value},
};
use std::io::Write;
use std::mem;

pub struct Parser<'a> {
    current: Token<'a>,
    previous: Token<'a>,
    scanner: Option<Box<Scanner<'a>>>,
    has_error: bool,
    panic_mode: bool,
    compilers: Vec<Compiler<'a>>,
    class_compilers: Vec<ClassCompiler>,
    global_mutability: Table,
    object_manager: &'a mut ObjectManager,
    intern_strings: &'a mut Table,
}

struct Local<'a> {
    name: Token<'a>,
    depth: i32,
    mutable: bool,
    captured: bool,
}

#[derive(Clone)]
struct Upvalue {
    index: usize,
    is_local: bool,
    mutable: bool,
}

struct LoopState {
    continue_offset: usize,
    break_jumps: Vec<u16>,
    scope_depth: i32,
}

struct ClassCompiler {
    has_superclass: bool,
}

#[derive(PartialEq, Clone, Copy)]
enum FunctionType {
    Function,
    Script,
    Method,
    Initializer,
}

struct Compiler<'a> {
    function: Box<ObjectFunction>,
    function_type: FunctionType,
    locals: Vec<Local<'a>>,
    upvalues: Vec<Upvalue>,
    scope_depth: i32,
    loops: Vec<LoopState>,
}

impl<'a> Compiler<'a> {
    fn new(function_type: FunctionType) -> Self {
        Compiler {
            function: Box::new(ObjectFunction::new(0, String::new())),
            function_type,
            locals: vec![],
            upvalues: vec![],
            scope_depth: 0,
            loops: vec![],
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParserFn = fn(&mut Parser<'_>, can_assign: bool);

#[derive(Clone, Copy)]
struct ParseRule {
    prefix: Option<ParserFn>,
    infix: Option<ParserFn>,
    precedence: Precedence,
}

impl ParseRule {
    const fn new(prefix: Option<ParserFn>, infix: Option<ParserFn>, precedence: Precedence) -> Self {
        ParseRule { prefix, infix, precedence }
    }
}

const RULES: [ParseRule; TokenType::Eof as usize + 1] = {
    let mut rules = [ParseRule::new(None, None, Precedence::None); TokenType::Eof as usize + 1];

    rules[TokenType::LeftParen as usize] =
        ParseRule::new(Some(|p, _| p.grouping()), Some(|p, ca| p.call(ca)), Precedence::Call);
    rules[TokenType::Dot as usize] =
        ParseRule::new(None, Some(|p, ca| p.dot(ca)), Precedence::Call);
    rules[TokenType::Minus as usize] =
        ParseRule::new(Some(|p, _| p.unary()), Some(|p, _| p.binary()), Precedence::Term);
    rules[TokenType::Plus as usize] = ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Term);
    rules[TokenType::Slash as usize] = ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Factor);
    rules[TokenType::Star as usize] = ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Factor);
    rules[TokenType::Number as usize] = ParseRule::new(Some(|p, _| p.number()), None, Precedence::None);
    rules[TokenType::String as usize] = ParseRule::new(Some(|p, _| p.string()), None, Precedence::None);
    rules[TokenType::False as usize] = ParseRule::new(Some(|p, _| p.literal()), None, Precedence::None);
    rules[TokenType::True as usize] = ParseRule::new(Some(|p, _| p.literal()), None, Precedence::None);
    rules[TokenType::Nil as usize] = ParseRule::new(Some(|p, _| p.literal()), None, Precedence::None);
    rules[TokenType::Bang as usize] = ParseRule::new(Some(|p, _| p.unary()), None, Precedence::None);
    rules[TokenType::BangEqual as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Equality);
    rules[TokenType::EqualEqual as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Equality);
    rules[TokenType::Greater as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Comparison);
    rules[TokenType::GreaterEqual as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Comparison);
    rules[TokenType::Less as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Comparison);
    rules[TokenType::LessEqual as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Comparison);
    rules[TokenType::Identifier as usize] =
        ParseRule::new(Some(|p, ca| p.variable(ca)), None, Precedence::None);
    rules[TokenType::And as usize] = ParseRule::new(None, Some(|p, ca| p.and(ca)), Precedence::And);
    rules[TokenType::Or as usize] = ParseRule::new(None, Some(|p, ca| p.or(ca)), Precedence::Or);
    rules[TokenType::This as usize] = ParseRule::new(Some(|p, ca| p.this_(ca)), None, Precedence::None);
    rules[TokenType::Super as usize] = ParseRule::new(Some(|p, ca| p.super_(ca)), None, Precedence::None);

    rules
};

impl<'a> Parser<'a> {
    pub fn new(object_manager: &'a mut ObjectManager, intern_strings: &'a mut Table) -> Box<Parser<'a>> {
        let mut parser = Box::new(Parser {
            current: Token { token_type: TokenType::Eof, value: "", line: 0 },
            previous: Token { token_type: TokenType::Eof, value: "", line: 0 },
            scanner: None,
            has_error: false,
            panic_mode: false,
            compilers: vec![],
            class_compilers: vec![],
            global_mutability: Table::new(),
            object_manager,
            intern_strings,
        });
        parser.init_compiler(FunctionType::Script);
        parser
    }

    /// Compiles `source` into the top-level script function. Returns
    /// `None` on any compile error (spec.md §7: errors are printed
    /// synchronously, `interpret()` does not execute).
    pub fn compile(&mut self, source: &'a str) -> Option<*mut ObjectFunction> {
        self.scanner = Some(Scanner::new(source));
        self.current = Token { token_type: TokenType::Eof, value: "", line: 0 };
        self.previous = Token { token_type: TokenType::Eof, value: "", line: 0 };

        self.advance();
        while !self.match_token(TokenType::Eof) {
            self.declaration();
        }
        self.consume(TokenType::Eof, "Expect end of expression.");

        self.end_compiler().map(|(ptr, _)| ptr)
    }

    pub fn had_error(&self) -> bool {
        self.has_error
    }

    // ---- compiler-chain accessors ----

    fn specific_compiler(&self, index: usize) -> &Compiler<'a> {
        self.compilers.get(index).expect("compiler index is invalid")
    }

    fn specific_compiler_mut(&mut self, index: usize) -> &mut Compiler<'a> {
        self.compilers.get_mut(index).expect("compiler index is invalid")
    }

    fn current_compiler(&self) -> &Compiler<'a> {
        self.compilers.last().expect("no active compiler")
    }

    fn current_compiler_mut(&mut self) -> &mut Compiler<'a> {
        self.compilers.last_mut().expect("no active compiler")
    }

    fn current_function(&self) -> &ObjectFunction {
        &self.current_compiler().function
    }

    fn current_function_mut(&mut self) -> &mut ObjectFunction {
        &mut self.current_compiler_mut().function
    }

    fn current_chunk(&self) -> &Chunk {
        &self.current_function().chunk
    }

    fn current_chunk_mut(&mut self) -> &mut Chunk {
        &mut self.current_function_mut().chunk
    }

    fn current_locals(&self) -> &Vec<Local<'a>> {
        &self.current_compiler().locals
    }

    fn current_locals_mut(&mut self) -> &mut Vec<Local<'a>> {
        &mut self.current_compiler_mut().locals
    }

    // ---- token stream ----

    fn advance(&mut self) {
        self.previous = self.current.clone();
        loop {
            let scanner = self.scanner.as_mut().expect("scanner not initialized");
            self.current = scanner.scan_token();
            if self.current.token_type != TokenType::Error {
                break;
            }
            self.error_at_current(self.current.value);
        }
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if !self.check(token_type) {
            return false;
        }
        self.advance();
        true
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current.token_type == token_type
    }

    fn consume(&mut self, token_type: TokenType, message: &'static str) {
        if self.current.token_type == token_type {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    // ---- emission ----

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line as u32;
        self.current_chunk_mut().write(byte, line);
    }

    fn emit_bytes(&mut self, byte1: u8, byte2: u8) {
        self.emit_byte(byte1);
        self.emit_byte(byte2);
    }

    /// Pushes a literal constant, falling back to `CONSTANT_LONG` once the
    /// pool has grown past 256 entries (spec.md §4.4) — unlike
    /// `make_constant`, this never errors on a large pool since the 3-byte
    /// operand covers pools far larger than any realistic program needs.
    fn emit_constant(&mut self, value: Value) {
        let index = self
            .current_chunk()
            .find_constant(value)
            .unwrap_or_else(|| self.current_chunk_mut().add_constant(value));
        let line = self.previous.line as u32;
        if index <= u8::MAX as usize {
            self.emit_byte(OpCode::Constant.into());
            self.emit_byte(index as u8);
        } else {
            self.emit_byte(OpCode::ConstantLong.into());
            self.current_chunk_mut().write_constant_long_operand(index, line);
        }
    }

    fn emit_return(&mut self) {
        if self.current_compiler().function_type == FunctionType::Initializer {
            self.emit_bytes(OpCode::GetLocal.into(), 0);
        } else {
            self.emit_byte(OpCode::Nil.into());
        }
        self.emit_byte(OpCode::Return.into());
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        if let Some(index) = self.current_chunk().find_constant(value) {
            return index as u8;
        }
        let index = self.current_chunk_mut().add_constant(value);
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    fn emit_jump_bytes(&mut self, instruction: u8) -> u16 {
        self.emit_byte(instruction);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        (self.current_chunk().len() - 2) as u16
    }

    fn patch_jump_offset(&mut self, offset: u16) {
        let jump = self.current_chunk().len() as u16 - offset - 2;
        let high = ((jump >> 8) & 0xff) as u8;
        let low = (jump & 0xff) as u8;
        self.current_chunk_mut().write_at(offset as usize, high);
        self.current_chunk_mut().write_at(offset as usize + 1, low);
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_byte(OpCode::Loop.into());
        let offset = self.current_chunk().len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        self.emit_byte(((offset as u16) >> 8 & 0xff) as u8);
        self.emit_byte((offset as u16 & 0xff) as u8);
    }

    // ---- compiler lifecycle ----

    fn init_compiler(&mut self, function_type: FunctionType) {
        let mut compiler = Compiler::new(function_type);
        if compiler.function_type != FunctionType::Script {
            compiler.function.name = self.previous.value.to_string();
        }
        // Slot 0 holds the receiver for methods/initializers, the callee
        // closure (unnamed, unreferenceable) everywhere else.
        let slot0_name = if matches!(function_type, FunctionType::Method | FunctionType::Initializer) {
            "this"
        } else {
            ""
        };
        compiler.locals.push(Local {
            name: Token { token_type: TokenType::Identifier, value: slot0_name, line: 0 },
            depth: 0,
            mutable: false,
            captured: false,
        });
        self.compilers.push(compiler);
    }

    /// Pops the current compiler, registering its finished function with
    /// the object manager. Returns `None` on error so callers can skip
    /// emitting a dangling `CLOSURE`.
    fn end_compiler(&mut self) -> Option<(*mut ObjectFunction, Vec<Upvalue>)> {
        self.emit_return();
        debug_feature::disassemble_chunk(self);

        let upvalues = self.current_compiler().upvalues.clone();
        self.current_function_mut().upvalue_count = upvalues.len();

        let boxed_function =
            mem::replace(&mut self.current_compiler_mut().function, Box::new(ObjectFunction::new(0, String::new())));
        self.compilers.pop();

        if self.has_error {
            return None;
        }
        let ptr = self.object_manager.adopt_function(boxed_function);
        Some((ptr, upvalues))
    }

    // ---- declarations ----

    fn declaration(&mut self) {
        if self.match_token(TokenType::Class) {
            self.class_declaration();
        } else if self.match_token(TokenType::Fun) {
            self.function_declaration();
        } else if self.match_token(TokenType::Var) {
            self.variable_declaration(true);
        } else if self.match_token(TokenType::Final) {
            self.variable_declaration(false);
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn variable_declaration(&mut self, mutable: bool) {
        let global = self.parse_variable("Expect variable name.", mutable);

        if self.match_token(TokenType::Equal) {
            self.expression();
        } else if !mutable {
            self.error("Final variable must be initialized.");
        } else {
            self.emit_byte(OpCode::Nil.into());
        }
        self.consume(TokenType::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn parse_variable(&mut self, message: &'static str, mutable: bool) -> u8 {
        self.consume(TokenType::Identifier, message);
        self.declare_variable(mutable);
        if self.current_compiler().scope_depth > 0 {
            return 0;
        }
        let name_value = make_string_value(self.object_manager, self.intern_strings, self.previous.value);
        self.global_mutability.set(name_value, make_bool_value(mutable));
        self.make_constant(name_value)
    }

    fn declare_variable(&mut self, mutable: bool) {
        if self.current_compiler().scope_depth == 0 {
            return;
        }

        let variable_name = self.previous.clone();
        let scope_depth = self.current_compiler().scope_depth;
        let mut duplicate = false;
        for local in self.current_locals().iter().rev() {
            if local.depth != -1 && local.depth < scope_depth {
                break;
            }
            if Self::identifier_equal(&variable_name, &local.name) {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(variable_name, mutable);
    }

    fn add_local(&mut self, name: Token<'a>, mutable: bool) {
        if self.current_locals().len() >= STACK_SLOTS_PER_FRAME {
            self.error("Too many local variables in function.");
            return;
        }
        self.current_locals_mut().push(Local { name, depth: -1, mutable, captured: false });
    }

    fn identifier_equal(left: &Token, right: &Token) -> bool {
        left.value == right.value
    }

    fn synthetic_token(text: &'static str) -> Token<'static> {
        Token { token_type: TokenType::Identifier, value: text, line: 0 }
    }

    fn function_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.", true);
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn function(&mut self, function_type: FunctionType) {
        self.init_compiler(function_type);
        self.begin_scope();

        self.consume(TokenType::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenType::RightParen) {
            loop {
                if self.current_function().arity == 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.current_function_mut().arity += 1;
                }
                let constant = self.parse_variable("Expect parameter name.", true);
                self.define_variable(constant);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.");
        self.consume(TokenType::LeftBrace, "Expect '{' before function body.");
        self.block();

        if let Some((function_ptr, upvalues)) = self.end_compiler() {
            let constant = self.make_constant(make_function_value(function_ptr));
            self.emit_bytes(OpCode::Closure.into(), constant);
            for upvalue in &upvalues {
                self.emit_byte(if upvalue.is_local { 1 } else { 0 });
                self.emit_byte(upvalue.index as u8);
            }
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenType::Identifier, "Expect class name.");
        let class_name = self.previous.clone();
        let name_constant = self.identifier_constant(class_name.clone());
        self.declare_variable(true);

        self.emit_bytes(OpCode::Class.into(), name_constant);
        self.define_variable(name_constant);

        self.class_compilers.push(ClassCompiler { has_superclass: false });

        if self.match_token(TokenType::Less) {
            self.consume(TokenType::Identifier, "Expect superclass name.");
            self.variable(false);
            if Self::identifier_equal(&class_name, &self.previous) {
                self.error("A class can't inherit from itself.");
            }

            self.begin_scope();
            self.add_local(Self::synthetic_token("super"), false);
            self.define_variable(0);

            self.named_variable(class_name.clone(), false);
            self.emit_byte(OpCode::Inherit.into());
            self.class_compilers.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(class_name, false);
        self.consume(TokenType::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.method();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after class body.");
        self.emit_byte(OpCode::Pop.into());

        if self.class_compilers.last().unwrap().has_superclass {
            self.end_scope();
        }
        self.class_compilers.pop();
    }

    fn method(&mut self) {
        self.consume(TokenType::Identifier, "Expect method name.");
        let method_name = self.previous.clone();
        let constant = self.identifier_constant(method_name.clone());

        let function_type =
            if method_name.value == "init" { FunctionType::Initializer } else { FunctionType::Method };
        self.function(function_type);
        self.emit_bytes(OpCode::Method.into(), constant);
    }

    fn identifier_constant(&mut self, name: Token) -> u8 {
        let value = make_string_value(self.object_manager, self.intern_strings, name.value);
        self.make_constant(value)
    }

    fn define_variable(&mut self, global: u8) {
        if self.current_compiler().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_bytes(OpCode::DefineGlobal.into(), global);
    }

    fn mark_initialized(&mut self) {
        if self.current_compiler().scope_depth == 0 {
            return;
        }
        let depth = self.current_compiler().scope_depth;
        self.current_locals_mut().last_mut().unwrap().depth = depth;
    }

    // ---- variable resolution ----

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous.clone(), can_assign);
    }

    fn named_variable(&mut self, name: Token<'a>, can_assign: bool) {
        let compiler_index = self.compilers.len() - 1;

        let mut get_op = OpCode::GetLocal;
        let mut set_op = OpCode::SetLocal;
        let mut mutable;
        let mut index = self.resolve_local(compiler_index, &name);

        if index != -1 {
            mutable = self.specific_compiler(compiler_index).locals[index as usize].mutable;
        } else {
            index = self.resolve_upvalue(compiler_index, &name);
            if index != -1 {
                get_op = OpCode::GetUpvalue;
                set_op = OpCode::SetUpvalue;
                mutable = self.specific_compiler(compiler_index).upvalues[index as usize].mutable;
            } else {
                let value = make_string_value(self.object_manager, self.intern_strings, name.value);
                index = self.make_constant(value) as i32;
                get_op = OpCode::GetGlobal;
                set_op = OpCode::SetGlobal;
                mutable = !matches!(self.global_mutability.get(&value), Some(Value::Bool(false)));
            }
        }

        if can_assign && self.match_token(TokenType::Equal) {
            if !mutable {
                self.error("Attempted to mutate a final variable.");
            }
            self.expression();
            self.emit_bytes(set_op.into(), index as u8);
        } else {
            let _ = &mutable;
            self.emit_bytes(get_op.into(), index as u8);
        }
    }

    fn resolve_local(&mut self, compiler_index: usize, name: &Token) -> i32 {
        let compiler = self.specific_compiler(compiler_index);
        for (index, local) in compiler.locals.iter().enumerate().rev() {
            if Self::identifier_equal(name, &local.name) {
                if local.depth == -1 {
                    self.error("Can't read local variable in its own initializer.");
                }
                return index as i32;
            }
        }
        -1
    }

    fn resolve_upvalue(&mut self, compiler_index: usize, name: &Token) -> i32 {
        if compiler_index == 0 {
            return -1;
        }

        let local = self.resolve_local(compiler_index - 1, name);
        if local != -1 {
            let mutable = self.specific_compiler(compiler_index - 1).locals[local as usize].mutable;
            self.specific_compiler_mut(compiler_index - 1).locals[local as usize].captured = true;
            return self.add_upvalue(compiler_index, local as usize, true, mutable) as i32;
        }

        let upvalue = self.resolve_upvalue(compiler_index - 1, name);
        if upvalue != -1 {
            let mutable = self.specific_compiler(compiler_index - 1).upvalues[upvalue as usize].mutable;
            return self.add_upvalue(compiler_index, upvalue as usize, false, mutable) as i32;
        }

        -1
    }

    fn add_upvalue(&mut self, compiler_index: usize, index: usize, is_local: bool, mutable: bool) -> usize {
        {
            let compiler = self.specific_compiler(compiler_index);
            for (i, upvalue) in compiler.upvalues.iter().enumerate() {
                if upvalue.is_local == is_local && upvalue.index == index {
                    return i;
                }
            }
            if compiler.upvalues.len() >= 256 {
                self.error("Too many closure variables in function.");
                return 0;
            }
        }
        let compiler = self.specific_compiler_mut(compiler_index);
        compiler.upvalues.push(Upvalue { index, is_local, mutable });
        compiler.upvalues.len() - 1
    }

    // ---- `this` / `super` ----

    fn this_(&mut self, _can_assign: bool) {
        if self.class_compilers.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.variable(false);
    }

    fn super_(&mut self, _can_assign: bool) {
        if self.class_compilers.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self.class_compilers.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
        }

        self.consume(TokenType::Dot, "Expect '.' after 'super'.");
        self.consume(TokenType::Identifier, "Expect superclass method name.");
        let name_constant = self.identifier_constant(self.previous.clone());

        self.named_variable(Self::synthetic_token("this"), false);
        if self.match_token(TokenType::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable(Self::synthetic_token("super"), false);
            self.emit_bytes(OpCode::SuperInvoke.into(), name_constant);
            self.emit_byte(arg_count);
        } else {
            self.named_variable(Self::synthetic_token("super"), false);
            self.emit_bytes(OpCode::GetSuper.into(), name_constant);
        }
    }

    // ---- scopes / blocks ----

    fn begin_scope(&mut self) {
        self.current_compiler_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.current_compiler_mut().scope_depth -= 1;
        let scope_depth = self.current_compiler().scope_depth;
        loop {
            let keep_going = match self.current_locals().last() {
                Some(local) => local.depth > scope_depth,
                None => false,
            };
            if !keep_going {
                break;
            }
            let captured = self.current_locals().last().unwrap().captured;
            self.emit_byte(if captured { OpCode::CloseUpvalue.into() } else { OpCode::Pop.into() });
            self.current_locals_mut().pop();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.declaration();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.");
    }

    /// Emits the close-or-pop sequence for every local declared deeper
    /// than `target_depth`, without removing them from `locals` — used by
    /// `break`/`continue` to unwind the stack before an early jump while
    /// leaving the enclosing block's own `end_scope` bookkeeping intact.
    fn emit_pop_locals_above(&mut self, target_depth: i32) {
        let count = self.current_locals().iter().rev().take_while(|l| l.depth > target_depth).count();
        let len = self.current_locals().len();
        for i in 0..count {
            let captured = self.current_locals()[len - 1 - i].captured;
            self.emit_byte(if captured { OpCode::CloseUpvalue.into() } else { OpCode::Pop.into() });
        }
    }

    // ---- statements ----

    fn statement(&mut self) {
        if self.match_token(TokenType::If) {
            self.if_statement();
        } else if self.match_token(TokenType::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else if self.match_token(TokenType::While) {
            self.while_statement();
        } else if self.match_token(TokenType::For) {
            self.for_statement();
        } else if self.match_token(TokenType::Switch) {
            self.switch_statement();
        } else if self.match_token(TokenType::Break) {
            self.break_statement();
        } else if self.match_token(TokenType::Continue) {
            self.continue_statement();
        } else if self.match_token(TokenType::Return) {
            self.return_statement();
        } else if self.match_token(TokenType::Print) {
            self.print_statement();
        } else {
            self.expression_statement();
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump_bytes(OpCode::JumpIfFalse.into());
        self.emit_byte(OpCode::Pop.into());
        self.statement();

        let else_jump = self.emit_jump_bytes(OpCode::Jump.into());
        self.patch_jump_offset(then_jump);
        self.emit_byte(OpCode::Pop.into());

        if self.match_token(TokenType::Else) {
            self.statement();
        }
        self.patch_jump_offset(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().len();
        self.current_compiler_mut().loops.push(LoopState {
            continue_offset: loop_start,
            break_jumps: vec![],
            scope_depth: self.current_compiler().scope_depth,
        });

        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump_bytes(OpCode::JumpIfFalse.into());
        self.emit_byte(OpCode::Pop.into());
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump_offset(exit_jump);
        self.emit_byte(OpCode::Pop.into());

        let loop_state = self.current_compiler_mut().loops.pop().unwrap();
        for jump in loop_state.break_jumps {
            self.patch_jump_offset(jump);
        }
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenType::Semicolon) {
            // no initializer
        } else if self.match_token(TokenType::Var) {
            self.variable_declaration(true);
        } else if self.match_token(TokenType::Final) {
            self.variable_declaration(false);
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().len();
        let mut exit_jump: i32 = -1;
        if !self.match_token(TokenType::Semicolon) {
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after loop condition.");
            exit_jump = self.emit_jump_bytes(OpCode::JumpIfFalse.into()) as i32;
            self.emit_byte(OpCode::Pop.into());
        }

        let mut continue_target = loop_start;
        if !self.match_token(TokenType::RightParen) {
            let body_jump = self.emit_jump_bytes(OpCode::Jump.into());
            let increment_start = self.current_chunk().len();
            continue_target = increment_start;
            self.expression();
            self.emit_byte(OpCode::Pop.into());
            self.consume(TokenType::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump_offset(body_jump);
        }

        self.current_compiler_mut().loops.push(LoopState {
            continue_offset: continue_target,
            break_jumps: vec![],
            scope_depth: self.current_compiler().scope_depth,
        });

        self.statement();
        self.emit_loop(loop_start);

        if exit_jump != -1 {
            self.patch_jump_offset(exit_jump as u16);
            self.emit_byte(OpCode::Pop.into());
        }

        let loop_state = self.current_compiler_mut().loops.pop().unwrap();
        for jump in loop_state.break_jumps {
            self.patch_jump_offset(jump);
        }

        self.end_scope();
    }

    /// Lowers per spec.md §4.5: `EQUAL_PRESERVE` keeps the subject on the
    /// stack across failed comparisons; a matched case drops only the
    /// comparison result and runs its body with the subject still live.
    /// The subject is registered as a synthetic local (same trick as the
    /// `super` receiver in `class_declaration`) so it occupies a real
    /// slot in `current_locals` — that lets `emit_pop_locals_above`
    /// account for it when a `break`/`continue` jumps out through this
    /// switch, and lets `end_scope` drop it on every other exit path
    /// (matched-case jump, unmatched fallthrough, or `default` falling
    /// off the end), all converging on the same cleanup.
    fn switch_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after 'switch'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after switch subject.");
        self.add_local(Self::synthetic_token("switch value"), false);
        self.define_variable(0);
        self.consume(TokenType::LeftBrace, "Expect '{' before switch body.");

        let mut end_jumps: Vec<u16> = Vec::new();
        let mut pending_skip: Option<u16> = None;

        while self.match_token(TokenType::Case) {
            if let Some(skip) = pending_skip.take() {
                self.patch_jump_offset(skip);
                self.emit_byte(OpCode::Pop.into());
            }

            self.expression();
            self.consume(TokenType::Colon, "Expect ':' after case value.");
            self.emit_byte(OpCode::EqualPreserve.into());
            let skip = self.emit_jump_bytes(OpCode::JumpIfFalse.into());

            self.emit_byte(OpCode::Pop.into()); // comparison result; subject stays, tracked as a local

            while !self.check(TokenType::Case) && !self.check(TokenType::Default) && !self.check(TokenType::RightBrace) {
                self.statement();
            }
            end_jumps.push(self.emit_jump_bytes(OpCode::Jump.into()));
            pending_skip = Some(skip);
        }

        if let Some(skip) = pending_skip.take() {
            self.patch_jump_offset(skip);
            self.emit_byte(OpCode::Pop.into());
        }

        if self.match_token(TokenType::Default) {
            self.consume(TokenType::Colon, "Expect ':' after 'default'.");
            while !self.check(TokenType::RightBrace) {
                self.statement();
            }
        }

        self.consume(TokenType::RightBrace, "Expect '}' after switch body.");

        for jump in end_jumps {
            self.patch_jump_offset(jump);
        }
        self.end_scope();
    }

    fn break_statement(&mut self) {
        if self.current_compiler().loops.is_empty() {
            self.error("Can't use 'break' outside of a loop.");
            self.consume(TokenType::Semicolon, "Expect ';' after 'break'.");
            return;
        }
        let target_depth = self.current_compiler().loops.last().unwrap().scope_depth;
        self.emit_pop_locals_above(target_depth);
        let jump = self.emit_jump_bytes(OpCode::Jump.into());
        self.current_compiler_mut().loops.last_mut().unwrap().break_jumps.push(jump);
        self.consume(TokenType::Semicolon, "Expect ';' after 'break'.");
    }

    fn continue_statement(&mut self) {
        if self.current_compiler().loops.is_empty() {
            self.error("Can't use 'continue' outside of a loop.");
            self.consume(TokenType::Semicolon, "Expect ';' after 'continue'.");
            return;
        }
        let loop_state = self.current_compiler().loops.last().unwrap();
        let target_depth = loop_state.scope_depth;
        let continue_offset = loop_state.continue_offset;
        self.emit_pop_locals_above(target_depth);
        self.emit_loop(continue_offset);
        self.consume(TokenType::Semicolon, "Expect ';' after 'continue'.");
    }

    fn return_statement(&mut self) {
        if self.current_compiler().function_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }

        if self.match_token(TokenType::Semicolon) {
            self.emit_return();
        } else {
            if self.current_compiler().function_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after return value.");
            self.emit_byte(OpCode::Return.into());
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.emit_byte(OpCode::Print.into());
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");
        self.emit_byte(OpCode::Pop.into());
    }

    // ---- expressions ----

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self) {
        let value = self.previous.value.parse::<f64>().unwrap_or(0.0);
        self.emit_constant(make_numer_value(value));
    }

    fn string(&mut self) {
        // Byte-exact between the quotes; no escapes (spec.md §6).
        let content = &self.previous.value[1..self.previous.value.len() - 1];
        let value = make_string_value(self.object_manager, self.intern_strings, content);
        self.emit_constant(value);
    }

    fn unary(&mut self) {
        let operator_type = self.previous.token_type;
        self.parse_precedence(Precedence::Unary);
        match operator_type {
            TokenType::Bang => self.emit_byte(OpCode::Not.into()),
            TokenType::Minus => self.emit_byte(OpCode::Negate.into()),
            _ => unreachable!("Expect unary operator."),
        }
    }

    fn binary(&mut self) {
        let operator_type = self.previous.token_type;
        let rule = RULES[operator_type as usize];
        self.parse_precedence(rule.precedence.next());

        match operator_type {
            TokenType::BangEqual => self.emit_bytes(OpCode::Equal.into(), OpCode::Not.into()),
            TokenType::EqualEqual => self.emit_byte(OpCode::Equal.into()),
            TokenType::Greater => self.emit_byte(OpCode::Greater.into()),
            TokenType::GreaterEqual => self.emit_bytes(OpCode::Less.into(), OpCode::Not.into()),
            TokenType::Less => self.emit_byte(OpCode::Less.into()),
            TokenType::LessEqual => self.emit_bytes(OpCode::Greater.into(), OpCode::Not.into()),
            TokenType::Plus => self.emit_byte(OpCode::Add.into()),
            TokenType::Minus => self.emit_byte(OpCode::Subtract.into()),
            TokenType::Star => self.emit_byte(OpCode::Multiply.into()),
            TokenType::Slash => self.emit_byte(OpCode::Divide.into()),
            _ => unreachable!("Unexpected binary operator: {}", operator_type),
        }
    }

    fn literal(&mut self) {
        match self.previous.token_type {
            TokenType::False => self.emit_byte(OpCode::False.into()),
            TokenType::True => self.emit_byte(OpCode::True.into()),
            TokenType::Nil => self.emit_byte(OpCode::Nil.into()),
            _ => unreachable!("Unexpected literal: {}", self.previous.token_type),
        }
    }

    fn and(&mut self, _can_assign: bool) {
        let jump = self.emit_jump_bytes(OpCode::JumpIfFalse.into());
        self.emit_byte(OpCode::Pop.into());
        self.parse_precedence(Precedence::And);
        self.patch_jump_offset(jump);
    }

    fn or(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump_bytes(OpCode::JumpIfFalse.into());
        let end_jump = self.emit_jump_bytes(OpCode::Jump.into());
        self.patch_jump_offset(else_jump);
        self.emit_byte(OpCode::Pop.into());
        self.parse_precedence(Precedence::Or);
        self.patch_jump_offset(end_jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let argument_count = self.argument_list();
        self.emit_bytes(OpCode::Call.into(), argument_count);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenType::Identifier, "Expect property name after '.'.");
        let name_constant = self.identifier_constant(self.previous.clone());

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_bytes(OpCode::SetProperty.into(), name_constant);
        } else if self.match_token(TokenType::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_bytes(OpCode::Invoke.into(), name_constant);
            self.emit_byte(arg_count);
        } else {
            self.emit_bytes(OpCode::GetProperty.into(), name_constant);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut argument_count: u8 = 0;
        if !self.check(TokenType::RightParen) {
            loop {
                self.expression();
                if argument_count == 255 {
                    self.error("Can't have more than 255 arguments.");
                } else {
                    argument_count += 1;
                }
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after arguments.");
        argument_count
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let can_assign = precedence <= Precedence::Assignment;
        match RULES[self.previous.token_type as usize].prefix {
            Some(prefix) => prefix(self, can_assign),
            None => {
                self.error("Expect expression.");
                return;
            }
        }

        while precedence as u8 <= RULES[self.current.token_type as usize].precedence as u8 {
            self.advance();
            match RULES[self.previous.token_type as usize].infix {
                Some(infix) => infix(self, can_assign),
                None => {
                    self.error("Expect infix parse function.");
                    return;
                }
            }
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    // ---- error handling ----

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.token_type != TokenType::Eof {
            if self.previous.token_type == TokenType::Semicolon {
                return;
            }
            if matches!(
                self.current.token_type,
                TokenType::Class
                    | TokenType::Fun
                    | TokenType::Var
                    | TokenType::Final
                    | TokenType::For
                    | TokenType::If
                    | TokenType::While
                    | TokenType::Print
                    | TokenType::Return
            ) {
                return;
            }
            self.advance();
        }
    }

    fn error(&mut self, message: &str) {
        self.error_at(&self.previous.clone(), message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(&self.current.clone(), message);
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;

        let mut stderr = std::io::stderr();
        write!(stderr, "[line {}] Error", token.line).ok();
        match token.token_type {
            TokenType::Eof => {
                write!(stderr, " at end").ok();
            }
            TokenType::Error => {}
            _ => {
                write!(stderr, " at '{}'", token.value).ok();
            }
        }
        writeln!(stderr, ": {}", message).ok();
        self.has_error = true;
    }
}

#[cfg(feature = "debug_print_code")]
mod debug_feature {
    use super::*;
    use crate::debug;

    pub fn disassemble_chunk(parser: &Parser) {
        if parser.has_error {
            return;
        }
        let name = if parser.current_function().name.is_empty() {
            "<script>".to_string()
        } else {
            parser.current_function().name.clone()
        };
        debug::disassemble_chunk(parser.current_chunk(), &name);
    }
}

#[cfg(not(feature = "debug_print_code"))]
mod debug_feature {
    use super::*;

    pub fn disassemble_chunk(_parser: &Parser) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::is_function;

    fn compile_ok(source: &str) -> bool {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let mut parser = Parser::new(&mut object_manager, &mut intern_strings);
        parser.compile(source).is_some()
    }

    #[test]
    fn compiles_arithmetic_expression() {
        assert!(compile_ok("print !(5 - 4 > 3 * 2 == !nil);"));
    }

    #[test]
    fn compiles_string_concatenation() {
        assert!(compile_ok("print \"st\" + \"ri\" + \"ng\";"));
    }

    #[test]
    fn interns_repeated_string_literals() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        {
            let mut parser = Parser::new(&mut object_manager, &mut intern_strings);
            assert!(parser.compile("\"same string\";").is_some());
        }
        {
            let mut parser = Parser::new(&mut object_manager, &mut intern_strings);
            assert!(parser.compile("\"same string\";").is_some());
        }
        assert_eq!(intern_strings.len(), 1);
    }

    #[test]
    fn compiles_closures_capturing_upvalues() {
        assert!(compile_ok(
            "fun counter() { var i = 0; fun inc() { i = i + 1; return i; } return inc; } \
             var c = counter(); print c();"
        ));
    }

    #[test]
    fn compiles_classes_with_inheritance_and_super() {
        assert!(compile_ok(
            "class A { greet() { print \"hi\"; } } \
             class B < A { greet() { super.greet(); } } \
             B().greet();"
        ));
    }

    #[test]
    fn rejects_mutation_of_final_global() {
        assert!(!compile_ok("final x = 1; x = 2;"));
    }

    #[test]
    fn rejects_mutation_of_final_local() {
        assert!(!compile_ok("{ final x = 1; x = 2; }"));
    }

    #[test]
    fn requires_initializer_for_final() {
        assert!(!compile_ok("final x;"));
    }

    #[test]
    fn compiles_switch_with_fallthrough_free_cases() {
        assert!(compile_ok(
            "var a = 2; switch (a) { case 1: print \"one\"; case 2: print \"two\"; default: print \"other\"; }"
        ));
    }

    #[test]
    fn compiles_break_and_continue_in_loops() {
        assert!(compile_ok(
            "for (var i = 0; i < 10; i = i + 1) { if (i == 2) continue; if (i == 5) break; print i; }"
        ));
    }

    #[test]
    fn rejects_break_outside_loop() {
        assert!(!compile_ok("break;"));
    }

    #[test]
    fn compiled_function_is_registered_in_object_manager() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let mut parser = Parser::new(&mut object_manager, &mut intern_strings);
        let function = parser.compile("fun f() { return 1; } print f;").unwrap();
        assert!(!function.is_null());
        drop(parser);
        assert!(object_manager.iter().count() >= 1);
    }

    #[test]
    fn compiles_past_256_distinct_constants_via_constant_long() {
        let mut source = String::new();
        for i in 0..300 {
            source.push_str(&format!("print {};", i));
        }
        assert!(compile_ok(&source));
    }

    #[test]
    fn function_value_reports_as_function() {
        use crate::value::make_function_value;
        let mut object_manager = ObjectManager::new();
        let function_ptr = object_manager.alloc_function(0, "f".to_string());
        assert!(is_function(&make_function_value(function_ptr)));
    }
}
