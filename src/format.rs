use crate::term::{TermData, Terms};
use crate::types::TermId;
use pretty::{Arena, DocAllocator, DocBuilder};

const WIDTH: usize = 100;

struct Pretty<'a> {
  terms: &'a Terms,
  arena: &'a Arena<'a>,
}

impl<'a> std::ops::Deref for Pretty<'a> {
  type Target = &'a Arena<'a>;
  fn deref(&self) -> &Self::Target { &self.arena }
}

type Doc<'a> = DocBuilder<'a, Arena<'a>>;

impl Pretty<'_> {
  fn with<R>(terms: &Terms, f: impl for<'b> FnOnce(&'b Pretty<'b>) -> R) -> R {
    let arena = Arena::new();
    f(&Pretty { terms, arena: &arena })
  }
}

impl<'a> Pretty<'a> {
  fn list(&self, head: Doc<'a>, args: impl IntoIterator<Item = Doc<'a>>) -> Doc<'a> {
    let mut doc = head;
    for arg in args {
      doc = doc.append(self.line()).append(arg)
    }
    doc.nest(2).group().parens()
  }

  fn term(&self, t: TermId) -> Doc<'a> {
    let tm = self.terms;
    match &tm[t] {
      TermData::Num(n) => self.text(n.to_string()),
      TermData::Str(s) => self.text(format!("{s:?}")),
      TermData::App(f, args) if args.is_empty() => self.text(tm.func_name(*f).to_owned()),
      TermData::App(f, args) =>
        self.list(self.text(tm.func_name(*f).to_owned()), args.iter().map(|&a| self.term(a))),
      TermData::Quant { kind, vars, body, cond } => {
        let vars = (self.intersperse(
          vars.iter().map(|&v| self.text(format!("?{}", tm.var_name(v)))),
          self.line(),
        ))
        .group()
        .parens();
        let mut args = vec![vars, self.term(*body)];
        if *cond != tm.tt {
          args.push(self.text(":when"));
          args.push(self.term(*cond));
        }
        self.list(self.text(kind.name()), args)
      }
      TermData::Case { scrut, arms } => self.list(
        self.text("case"),
        std::iter::once(self.term(*scrut)).chain(arms.iter().map(|&a| self.term(a))),
      ),
      TermData::Var(v) => self.text(format!("?{}", tm.var_name(*v))),
      TermData::Marked(v, level) => self.text(format!("?{}'{level}", tm.var_name(*v))),
      TermData::Index(n) => self.text(format!("#{n}")),
    }
  }
}

/// A term paired with its store, for printing.
pub struct Print<'a>(pub &'a Terms, pub TermId);

impl std::fmt::Display for Print<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Pretty::with(self.0, |p| p.term(self.1).render_fmt(WIDTH, f))
  }
}

impl std::fmt::Debug for Print<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{self}") }
}

impl Terms {
  pub fn pp(&self, t: TermId) -> Print<'_> { Print(self, t) }
}
