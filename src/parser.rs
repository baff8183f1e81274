use crate::bignum::Num;
use crate::error::{KernelError, Result};
use crate::term::{QuantKind, TermData, Terms};
use crate::types::*;
use num_bigint::BigInt;

/// Reader for the s-expression syntax printed by `Terms::pp`.
pub struct Parser<'a> {
  src: &'a str,
  pos: usize,
}

impl<'a> Parser<'a> {
  pub fn new(src: &'a str) -> Self { Self { src, pos: 0 } }

  fn err<T>(&self, msg: impl Into<String>) -> Result<T> {
    Err(KernelError::Parse { pos: self.pos, msg: msg.into() })
  }

  fn rest(&self) -> &'a str { &self.src[self.pos..] }

  fn skip_ws(&mut self) {
    loop {
      let rest = self.rest();
      let trimmed = rest.trim_start();
      self.pos += rest.len() - trimmed.len();
      if trimmed.starts_with(';') {
        self.pos += trimmed.find('\n').unwrap_or(trimmed.len())
      } else {
        return
      }
    }
  }

  pub fn at_end(&mut self) -> bool {
    self.skip_ws();
    self.pos == self.src.len()
  }

  fn eat(&mut self, c: char) -> bool {
    self.skip_ws();
    if self.rest().starts_with(c) {
      self.pos += c.len_utf8();
      true
    } else {
      false
    }
  }

  fn atom(&mut self) -> Result<&'a str> {
    self.skip_ws();
    let rest = self.rest();
    let len = rest.find(|c: char| c.is_whitespace() || "();\"".contains(c)).unwrap_or(rest.len());
    if len == 0 {
      return self.err("expected an atom")
    }
    self.pos += len;
    Ok(&rest[..len])
  }

  fn string(&mut self) -> Result<String> {
    let mut out = String::new();
    let mut chars = self.rest().char_indices();
    while let Some((i, c)) = chars.next() {
      match c {
        '"' => {
          self.pos += i + 1;
          return Ok(out)
        }
        '\\' => match chars.next() {
          Some((_, 'n')) => out.push('\n'),
          Some((_, c)) => out.push(c),
          None => break,
        },
        c => out.push(c),
      }
    }
    self.err("unterminated string")
  }

  fn number(&self, s: &str) -> Option<Num> {
    let int = |s: &str| s.parse::<BigInt>().ok();
    match s.split_once('/') {
      Some((n, d)) => Num::ratio(int(n)?, int(d)?).ok(),
      None => int(s).map(Num::int),
    }
  }

  fn vars(&mut self, terms: &mut Terms) -> Result<Box<[VarId]>> {
    if !self.eat('(') {
      return self.err("expected a variable list")
    }
    let mut vars = vec![];
    while !self.eat(')') {
      match self.atom()?.strip_prefix('?') {
        Some(name) => vars.push(terms.var(name)),
        None => return self.err("expected a ?variable"),
      }
    }
    Ok(vars.into())
  }

  /// Parse one term.
  pub fn term(&mut self, terms: &mut Terms) -> Result<TermId> {
    self.skip_ws();
    if self.eat('"') {
      let s = self.string()?;
      return Ok(terms.string(&s))
    }
    if !self.eat('(') {
      let atom = self.atom()?;
      if let Some(n) = self.number(atom) {
        return Ok(terms.num(n))
      }
      if let Some(name) = atom.strip_prefix('?') {
        let v = terms.var(name);
        return Ok(terms.mk_var(v))
      }
      if let Some(n) = atom.strip_prefix('#').and_then(|n| n.parse().ok()) {
        return Ok(terms.mk(TermData::Index(n)))
      }
      return Ok(terms.constant(atom))
    }
    let head = self.atom()?;
    let kind = match head {
      "forall" => Some(QuantKind::ForAll),
      "exists" => Some(QuantKind::Exists),
      "lambda" => Some(QuantKind::Lambda),
      _ => None,
    };
    if let Some(kind) = kind {
      let vars = self.vars(terms)?;
      let body = self.term(terms)?;
      self.skip_ws();
      let cond = if self.rest().starts_with(":when") {
        self.pos += ":when".len();
        self.term(terms)?
      } else {
        terms.tt
      };
      if !self.eat(')') {
        return self.err("expected ')' after quantifier body")
      }
      return Ok(terms.mk(TermData::Quant { kind, vars, body, cond }))
    }
    let mut args = vec![];
    while !self.eat(')') {
      if self.at_end() {
        return self.err("unbalanced parentheses")
      }
      args.push(self.term(terms)?)
    }
    if head == "case" {
      let Some((&scrut, arms)) = args.split_first() else { return self.err("case needs a scrutinee") };
      return Ok(terms.mk(TermData::Case { scrut, arms: arms.into() }))
    }
    let f = terms.func(head);
    Ok(terms.app(f, args))
  }
}

/// Parse exactly one term.
pub fn parse(terms: &mut Terms, src: &str) -> Result<TermId> {
  let mut p = Parser::new(src);
  let t = p.term(terms)?;
  if !p.at_end() {
    return p.err("trailing input")
  }
  Ok(t)
}

/// Parse a sequence of terms.
pub fn parse_all(terms: &mut Terms, src: &str) -> Result<Vec<TermId>> {
  let mut p = Parser::new(src);
  let mut out = vec![];
  while !p.at_end() {
    out.push(p.term(terms)?)
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::term::Builtin;

  #[test]
  fn reads_what_it_prints() {
    let mut tm = Terms::new();
    for src in [
      "(+ x 1)",
      "(= ?y \"a b\")",
      "(forall (?x ?y) (< ?x ?y) :when (p ?x))",
      "(exists (?x) (q ?x))",
      "(case s #0 3/4 -2)",
      "(not (and p q))",
    ] {
      let t = parse(&mut tm, src).unwrap();
      assert_eq!(tm.pp(t).to_string(), src);
    }
  }

  #[test]
  fn builtins_and_numbers() {
    let mut tm = Terms::new();
    let t = parse(&mut tm, "  ; comment\n (< x 6/3)").unwrap();
    let (b, args) = tm.as_builtin(t).unwrap();
    let arg1 = args[1];
    assert_eq!(b, Builtin::Lt);
    assert_eq!(arg1, tm.int(2));
    assert_eq!(parse_all(&mut tm, "a (b) c").unwrap().len(), 3);
  }

  #[test]
  fn errors() {
    let mut tm = Terms::new();
    assert!(matches!(parse(&mut tm, "(f x"), Err(KernelError::Parse { .. })));
    assert!(matches!(parse(&mut tm, "a b"), Err(KernelError::Parse { .. })));
    assert!(matches!(parse(&mut tm, "\"open"), Err(KernelError::Parse { .. })));
    assert!(matches!(parse(&mut tm, "(forall x p)"), Err(KernelError::Parse { .. })));
  }
}
