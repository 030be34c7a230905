//! Renders behavior trees back into the C-like concrete syntax. The
//! documentation driver prints whole blocks with it and error paths borrow
//! [`render_expr`] for single expressions.

use crate::rtl::ast::{LValue, RtlAssignment, RtlBlock, RtlExpr, RtlStatement};

const INDENT: &str = "    ";

/// Renders a whole behavior block, one statement per line, at indent zero.
pub fn render_block(block: &RtlBlock) -> String {
    let mut printer = Printer::new();
    for stmt in &block.statements {
        printer.statement(stmt);
    }
    printer.finish()
}

/// Renders a single statement (possibly multi-line for nested bodies).
pub fn render_statement(stmt: &RtlStatement) -> String {
    let mut printer = Printer::new();
    printer.statement(stmt);
    printer.finish()
}

pub fn render_expr(expr: &RtlExpr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

pub fn render_lvalue(lvalue: &LValue) -> String {
    let mut out = String::new();
    write_lvalue(&mut out, lvalue);
    out
}

struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn new() -> Self {
        Self { out: String::new(), depth: 0 }
    }

    fn finish(self) -> String {
        self.out
    }

    fn line_start(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn statement(&mut self, stmt: &RtlStatement) {
        self.line_start();
        match stmt {
            RtlStatement::Assignment(assign) => {
                self.assignment(assign);
                self.out.push_str(";\n");
            }
            RtlStatement::Conditional { condition, then_body, else_body } => {
                self.out.push_str("if (");
                write_expr(&mut self.out, condition);
                self.out.push_str(") {\n");
                self.body(then_body);
                self.line_start();
                self.out.push('}');
                if !else_body.is_empty() {
                    self.out.push_str(" else {\n");
                    self.body(else_body);
                    self.line_start();
                    self.out.push('}');
                }
                self.out.push('\n');
            }
            RtlStatement::MemoryStore { address, value } => {
                self.out.push_str("MEM[");
                write_expr(&mut self.out, address);
                self.out.push_str("] = ");
                write_expr(&mut self.out, value);
                self.out.push_str(";\n");
            }
            RtlStatement::MemoryLoad { target, address } => {
                write_lvalue(&mut self.out, target);
                self.out.push_str(" = MEM[");
                write_expr(&mut self.out, address);
                self.out.push_str("];\n");
            }
            RtlStatement::ForLoop { init, condition, update, body } => {
                self.out.push_str("for (");
                self.assignment(init);
                self.out.push_str("; ");
                write_expr(&mut self.out, condition);
                self.out.push_str("; ");
                self.assignment(update);
                self.out.push_str(") {\n");
                self.body(body);
                self.line_start();
                self.out.push_str("}\n");
            }
        }
    }

    fn body(&mut self, statements: &[RtlStatement]) {
        self.depth += 1;
        for stmt in statements {
            self.statement(stmt);
        }
        self.depth -= 1;
    }

    fn assignment(&mut self, assign: &RtlAssignment) {
        write_lvalue(&mut self.out, &assign.target);
        self.out.push_str(" = ");
        write_expr(&mut self.out, &assign.expr);
    }
}

fn write_lvalue(out: &mut String, lvalue: &LValue) {
    match lvalue {
        LValue::Register { reg, index } => {
            out.push_str(reg);
            if let Some(index) = index {
                out.push('[');
                write_expr(out, index);
                out.push(']');
            }
        }
        LValue::Field { reg, field } => {
            out.push_str(reg);
            out.push('.');
            out.push_str(field);
        }
        LValue::Variable(name) => out.push_str(name),
    }
}

fn write_expr(out: &mut String, expr: &RtlExpr) {
    match expr {
        RtlExpr::Constant(value) => {
            out.push_str(&value.to_string());
        }
        RtlExpr::OperandRef(name) => out.push_str(name),
        RtlExpr::Register { reg, index } => {
            out.push_str(reg);
            if let Some(index) = index {
                out.push('[');
                write_expr(out, index);
                out.push(']');
            }
        }
        RtlExpr::Field { reg, field } => {
            out.push_str(reg);
            out.push('.');
            out.push_str(field);
        }
        RtlExpr::Binary { op, left, right } => {
            out.push('(');
            write_expr(out, left);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            write_expr(out, right);
            out.push(')');
        }
        RtlExpr::Unary { op, expr } => {
            out.push_str(op.symbol());
            write_expr(out, expr);
        }
        RtlExpr::Ternary { condition, then_expr, else_expr } => {
            out.push('(');
            write_expr(out, condition);
            out.push_str(" ? ");
            write_expr(out, then_expr);
            out.push_str(" : ");
            write_expr(out, else_expr);
            out.push(')');
        }
        RtlExpr::BitSlice { base, msb, lsb } => {
            write_expr(out, base);
            out.push('[');
            out.push_str(&msb.to_string());
            out.push(':');
            out.push_str(&lsb.to_string());
            out.push(']');
        }
        RtlExpr::Call { function, args } => {
            out.push_str(function);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, arg);
            }
            out.push(')');
        }
    }
}
