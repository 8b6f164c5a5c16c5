use std::ops::Range;

use pest::iterators::Pair;

#[derive(pest_derive::Parser)]
#[grammar = "quill.pest"]
pub struct Parser;

/// Byte range into the source text.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Span(pub u32, pub u32);

impl Span {
    pub fn from_range(r: Range<usize>) -> Self {
        Self(r.start as u32, r.end as u32)
    }

    pub fn as_range(&self) -> Range<usize> {
        self.0 as usize..self.1 as usize
    }
}

pub trait FromSyntax<E> {
    fn from_syntax(node: &mut Node<E>) -> Self;
}

/// A cursor over the children of a pest pair. Children are taken out by
/// rule, so the order in which a `FromSyntax` impl asks for them doesn't
/// matter.
pub struct Node<'i, E> {
    pub rule: Rule,
    pub txt: &'i str,
    pub span: Span,
    pairs: Vec<Option<Pair<'i, Rule>>>,
    pub errors: Vec<E>,
    child: Option<Box<Self>>,
}

impl<'i, E> Node<'i, E> {
    pub fn new(pair: Pair<'i, Rule>) -> Self {
        let mut n = Self::default();
        n.set_pair(pair);
        n
    }

    fn set_pair(&mut self, pair: Pair<'i, Rule>) {
        self.rule = pair.as_rule();
        self.txt = pair.as_str();
        let s = pair.as_span();
        self.span = Span::from_range(s.start()..s.end());
        self.pairs.clear();
        self.pairs.extend(pair.into_inner().map(Some));
        debug_assert!(self.errors.is_empty());
    }

    fn clear<F>(&mut self, with_errors: F)
    where
        F: FnMut(E),
    {
        self.errors.drain(..).for_each(with_errors);
        self.pairs.clear();
    }

    fn with_child<F, T>(&mut self, pair: Pair<'i, Rule>, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        let mut child = self.child.take().unwrap_or_default();
        child.set_pair(pair);
        let r = f(&mut child);

        child.clear(|err| self.errors.push(err));
        self.child = Some(child);
        r
    }

    pub fn error(&mut self, err: E) {
        self.errors.push(err);
    }

    /// Rule of the first remaining child.
    pub fn peek_rule(&self) -> Option<Rule> {
        self.pairs.iter().flatten().map(|p| p.as_rule()).next()
    }

    pub fn descend_into<F, T>(&mut self, rule: Rule, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        match self.descend_into_opt(rule, f) {
            Some(r) => r,
            None => self.missing(rule),
        }
    }

    pub fn descend_into_opt<F, T>(&mut self, rule: Rule, f: F) -> Option<T>
    where
        F: FnOnce(&mut Self) -> T,
    {
        let p = self.get_opt(rule)?;
        Some(self.with_child(p, f))
    }

    /// Descends into the first remaining child, whatever its rule.
    pub fn descend_into_next<F, T>(&mut self, f: F) -> Option<T>
    where
        F: FnOnce(&mut Self) -> T,
    {
        let pos = self.pairs.iter().position(Option::is_some)?;
        let p = self.pairs.remove(pos)?;
        Some(self.with_child(p, f))
    }

    pub fn single<T: FromSyntax<E>>(&mut self, rule: Rule) -> T {
        match self.single_opt(rule) {
            Some(r) => r,
            None => self.missing(rule),
        }
    }

    pub fn single_opt<T: FromSyntax<E>>(&mut self, rule: Rule) -> Option<T> {
        let p = self.get_opt(rule)?;
        Some(self.with_child(p, T::from_syntax))
    }

    pub fn multi<T: FromSyntax<E>>(&mut self, rule: Rule) -> Vec<T> {
        let mut out = vec![];
        while let Some(t) = self.single_opt(rule) {
            out.push(t);
        }
        out
    }

    pub fn get_opt(&mut self, rule: Rule) -> Option<Pair<'i, Rule>> {
        let pos = self
            .pairs
            .iter()
            .position(|p| p.as_ref().is_some_and(|p| p.as_rule() == rule))?;
        self.pairs.remove(pos)
    }

    /// Text of the first child matching `rule`.
    pub fn str_of(&mut self, rule: Rule) -> &'i str {
        match self.get_opt(rule) {
            Some(p) => p.as_str(),
            None => self.missing(rule),
        }
    }

    /// Text and span of the first child matching `rule`.
    pub fn spanned_str_of(&mut self, rule: Rule) -> (&'i str, Span) {
        match self.get_opt(rule) {
            Some(p) => {
                let s = p.as_span();
                (p.as_str(), Span::from_range(s.start()..s.end()))
            }
            None => self.missing(rule),
        }
    }

    fn missing(&self, rule: Rule) -> ! {
        panic!(
            "grammar guarantees {rule:?} inside {:?}, found {:?}",
            self.rule, self.pairs
        )
    }
}

impl<E> Default for Node<'_, E> {
    fn default() -> Self {
        Self {
            rule: Rule::EOI,
            txt: Default::default(),
            span: Default::default(),
            pairs: vec![],
            errors: vec![],
            child: None,
        }
    }
}
