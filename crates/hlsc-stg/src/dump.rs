//! Text rendering of STGs for debug logs

use std::fmt::{self, Write};

use hlsc_ir::Design;

use crate::ahdl::{AhdlExpr, AhdlStm, SeqFactor, Target, WaitKind};
use crate::state::{State, Stg};

/// Renders AHDL with signal and state names resolved
pub struct AhdlFormatter<'a> {
    design: &'a Design,
    stgs: &'a [Stg],
    /// Scope-level index of `stgs[0]`
    first: usize,
}

impl<'a> AhdlFormatter<'a> {
    pub fn new(design: &'a Design, stgs: &'a [Stg]) -> Self {
        Self {
            design,
            stgs,
            first: 0,
        }
    }

    /// Formatter for the STG at scope-level index `index`
    pub fn single(design: &'a Design, stg: &'a Stg, index: usize) -> Self {
        Self {
            design,
            stgs: std::slice::from_ref(stg),
            first: index,
        }
    }

    pub fn expr(&self, exp: &AhdlExpr) -> String {
        match exp {
            AhdlExpr::Const(v) => v.to_string(),
            AhdlExpr::Var { sig, .. } | AhdlExpr::MemVar { sig, .. } => {
                self.design.sig(*sig).name.clone()
            }
            AhdlExpr::Symbol(s) => s.clone(),
            AhdlExpr::Op { op, args } => match args.as_slice() {
                [a] => format!("{}{}", op.symbol(), self.expr(a)),
                _ => {
                    let parts: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                    format!("({})", parts.join(&format!(" {} ", op.symbol())))
                }
            },
            AhdlExpr::IfExp { cond, then, els } => format!(
                "({} ? {} : {})",
                self.expr(cond),
                self.expr(then),
                self.expr(els)
            ),
            AhdlExpr::Subscript { mem, offset } => {
                format!("{}[{}]", self.expr(mem), self.expr(offset))
            }
            AhdlExpr::FunCall { name, args } => format!("{}({})", name, self.list(args)),
        }
    }

    fn list(&self, args: &[AhdlExpr]) -> String {
        args.iter()
            .map(|a| self.expr(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn target(&self, target: &Target) -> String {
        match target {
            Target::Next => "<next>".to_string(),
            Target::Block(b) => format!("<block {}>", b.0),
            Target::State(r) => self
                .stgs
                .get(r.stg.wrapping_sub(self.first))
                .and_then(|stg| stg.states.get(r.state))
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| format!("S{}.{}", r.stg, r.state)),
        }
    }

    fn factor(&self, factor: &SeqFactor) -> String {
        match factor {
            SeqFactor::ModuleCall {
                instance_name,
                args,
                ..
            } => format!("{}({})", instance_name, self.list(args)),
            SeqFactor::IoRead { port, dst, .. } => match dst {
                Some(d) => format!("{} <= {}.rd()", self.expr(d), self.expr(port)),
                None => format!("{}.rd()", self.expr(port)),
            },
            SeqFactor::IoWrite { port, src, .. } => {
                format!("{}.wr({})", self.expr(port), self.expr(src))
            }
            SeqFactor::Load { mem, dst, offset } => format!(
                "{} <= {}[{}]",
                self.expr(dst),
                self.expr(mem),
                self.expr(offset)
            ),
            SeqFactor::Store { mem, src, offset } => format!(
                "{}[{}] <= {}",
                self.expr(mem),
                self.expr(offset),
                self.expr(src)
            ),
            SeqFactor::CalleeProlog(name) | SeqFactor::CalleeEpilog(name) => name.clone(),
        }
    }

    pub fn stm(&self, out: &mut String, stm: &AhdlStm, indent: usize) {
        let pad = "  ".repeat(indent);
        match stm {
            AhdlStm::Move { dst, src } => {
                let _ = writeln!(out, "{}{} <= {}", pad, self.expr(dst), self.expr(src));
            }
            AhdlStm::If { conds, blocks } | AhdlStm::TransitionIf { conds, blocks } => {
                for (i, (cond, block)) in conds.iter().zip(blocks).enumerate() {
                    let kw = if i == 0 { "if" } else { "elif" };
                    let _ = writeln!(out, "{}{} {}:", pad, kw, self.expr(cond));
                    for code in block {
                        self.stm(out, code, indent + 1);
                    }
                }
            }
            AhdlStm::PipelineGuard { cond, codes } => {
                let _ = writeln!(out, "{}guard {}:", pad, self.expr(cond));
                for code in codes {
                    self.stm(out, code, indent + 1);
                }
            }
            AhdlStm::Transition(target) => {
                let _ = writeln!(out, "{}goto {}", pad, self.target(target));
            }
            AhdlStm::MetaWait { kind, transition } => {
                let what = match kind {
                    WaitKind::Edge { old, new, ports } => format!(
                        "edge {}->{} on {}",
                        self.expr(old),
                        self.expr(new),
                        self.list(ports)
                    ),
                    WaitKind::Value { expects } => expects
                        .iter()
                        .map(|(v, p)| format!("{} == {}", self.expr(p), self.expr(v)))
                        .collect::<Vec<_>>()
                        .join(" && "),
                };
                let _ = writeln!(out, "{}wait {}", pad, what);
                if let Some(t) = transition {
                    self.stm(out, t, indent + 1);
                }
            }
            AhdlStm::Seq {
                factor,
                step,
                step_n,
            } => {
                let _ = writeln!(
                    out,
                    "{}{} {} [{}/{}]",
                    pad,
                    factor.name(),
                    self.factor(factor),
                    step + 1,
                    step_n
                );
            }
            AhdlStm::ProcCall { name, args } => {
                let _ = writeln!(out, "{}{}({})", pad, name, self.list(args));
            }
            AhdlStm::Inline(code) => {
                let _ = writeln!(out, "{}{}", pad, code);
            }
            AhdlStm::Nop(info) => {
                let _ = writeln!(out, "{}nop ({})", pad, info);
            }
        }
    }

    pub fn state(&self, out: &mut String, state: &State) {
        let _ = writeln!(out, "---------------------------------");
        match state {
            State::Plain(s) => {
                let _ = writeln!(out, "{}:{}", s.name, s.step);
                for code in &s.codes {
                    self.stm(out, code, 1);
                }
            }
            State::Pipeline(p) => {
                let _ = writeln!(out, "{}", p.name);
                for stage in &p.stages {
                    let _ = writeln!(out, "  ---{}---", stage.name);
                    if let Some(enable) = &stage.enable {
                        self.stm(out, enable, 2);
                    }
                    for code in &stage.codes {
                        self.stm(out, code, 2);
                    }
                }
            }
        }
    }
}

impl fmt::Display for AhdlFormatter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stg in self.stgs {
            let mut out = String::new();
            for state in &stg.states {
                self.state(&mut out, state);
            }
            writeln!(f, "stg {} ({:?})", stg.name, stg.scheduling)?;
            f.write_str(&out)?;
        }
        Ok(())
    }
}

impl Stg {
    /// Listing of this STG, the `index`-th of its scope
    ///
    /// Targets into other STGs print as `S{stg}.{state}`.
    pub fn display(&self, design: &Design, index: usize) -> String {
        AhdlFormatter::single(design, self, index).to_string()
    }
}
