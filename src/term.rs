//! Terms, variables, bindings, unification and substitution.
//!
//! The store and the engine never see anything but `Term`; the parser in
//! [`crate::query`] and the rule compiler in [`crate::rulepack`] are the only
//! producers of `Term`s that contain [`Term::Variable`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An atom, variable, or compound term.
///
/// Atoms and compound functors are interned `Arc<str>` so that repeated
/// predicate names across thousands of facts don't re-allocate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    /// A ground identifier, e.g. `alice` or `"a string literal"`.
    Atom(Arc<str>),
    /// A binding-target, written `?x` in the textual pattern grammar.
    Variable(Arc<str>),
    /// A functor applied to an ordered list of argument terms.
    Compound(Arc<str>, Vec<Term>),
}

impl Term {
    pub fn atom(name: impl Into<Arc<str>>) -> Self {
        Term::Atom(name.into())
    }

    pub fn var(name: impl Into<Arc<str>>) -> Self {
        Term::Variable(name.into())
    }

    pub fn compound(functor: impl Into<Arc<str>>, args: Vec<Term>) -> Self {
        Term::Compound(functor.into(), args)
    }

    /// `(functor, arity)` for a compound term; `None` for atoms/variables.
    pub fn head(&self) -> Option<(&str, usize)> {
        match self {
            Term::Compound(f, args) => Some((f.as_ref(), args.len())),
            _ => None,
        }
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Atom(_) => true,
            Term::Variable(_) => false,
            Term::Compound(_, args) => args.iter().all(Term::is_ground),
        }
    }

    pub fn args(&self) -> &[Term] {
        match self {
            Term::Compound(_, args) => args,
            _ => &[],
        }
    }

    /// Collect distinct variables, in first-occurrence order.
    pub fn variables(&self) -> Vec<Arc<str>> {
        let mut seen = Vec::new();
        self.collect_variables(&mut seen);
        seen
    }

    fn collect_variables(&self, out: &mut Vec<Arc<str>>) {
        match self {
            Term::Atom(_) => {}
            Term::Variable(v) => {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Term::Compound(_, args) => {
                for a in args {
                    a.collect_variables(out);
                }
            }
        }
    }

    /// Replace every bound variable with its value; unbound variables are
    /// left untouched.
    pub fn substitute(&self, binding: &Binding) -> Term {
        match self {
            Term::Atom(_) => self.clone(),
            Term::Variable(v) => binding.get(v).cloned().unwrap_or_else(|| self.clone()),
            Term::Compound(f, args) => {
                Term::Compound(f.clone(), args.iter().map(|a| a.substitute(binding)).collect())
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(a) => write!(f, "{a}"),
            Term::Variable(v) => write!(f, "?{v}"),
            Term::Compound(functor, args) => {
                write!(f, "{functor}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A finite map from variable name to ground term.
///
/// Backed by a `BTreeMap` rather than a `HashMap` so that two bindings built
/// from the same unification steps compare and iterate identically,
/// keeping query results deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding(BTreeMap<Arc<str>, Term>);

impl Binding {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, var: &str) -> Option<&Term> {
        self.0.get(var)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.0.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// Bind `var` to `value`. Fails if `var` is already bound to a
    /// structurally different term (conflicting binding).
    pub fn bind(&mut self, var: Arc<str>, value: Term) -> bool {
        match self.0.get(&var) {
            Some(existing) => *existing == value,
            None => {
                self.0.insert(var, value);
                true
            }
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }
}

/// Structural unification of `pattern` against `ground` under a partial
/// [`Binding`]. `ground` need not actually be ground; unifying two patterns
/// against each other (as happens mid-join in the inference engine) is
/// also well-defined.
pub fn unify(pattern: &Term, ground: &Term, binding: &Binding) -> Option<Binding> {
    let mut out = binding.clone();
    unify_into(pattern, ground, &mut out).then_some(out)
}

fn unify_into(pattern: &Term, ground: &Term, binding: &mut Binding) -> bool {
    match (pattern, ground) {
        (Term::Variable(v), _) => {
            let resolved = binding.get(v).cloned();
            match resolved {
                Some(existing) => unify_into(&existing, ground, binding),
                None => binding.bind(v.clone(), ground.clone()),
            }
        }
        (_, Term::Variable(v)) => {
            let resolved = binding.get(v).cloned();
            match resolved {
                Some(existing) => unify_into(pattern, &existing, binding),
                None => binding.bind(v.clone(), pattern.clone()),
            }
        }
        (Term::Atom(a), Term::Atom(b)) => a == b,
        (Term::Compound(f1, a1), Term::Compound(f2, a2)) => {
            f1 == f2 && a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| unify_into(x, y, binding))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unify_ground_atoms() {
        let a = Term::atom("x");
        let b = Term::atom("x");
        assert!(unify(&a, &b, &Binding::new()).is_some());
        let c = Term::atom("y");
        assert!(unify(&a, &c, &Binding::new()).is_none());
    }

    #[test]
    fn unify_binds_variable() {
        let pattern = Term::compound("parentOf", vec![Term::var("x"), Term::atom("b")]);
        let ground = Term::compound("parentOf", vec![Term::atom("a"), Term::atom("b")]);
        let binding = unify(&pattern, &ground, &Binding::new()).unwrap();
        assert_eq!(binding.get("x"), Some(&Term::atom("a")));
    }

    #[test]
    fn unify_rejects_conflicting_binding() {
        let pattern = Term::compound("eq", vec![Term::var("x"), Term::var("x")]);
        let ground = Term::compound("eq", vec![Term::atom("a"), Term::atom("b")]);
        assert!(unify(&pattern, &ground, &Binding::new()).is_none());
    }

    #[test]
    fn substitute_replaces_bound_variables_only() {
        let mut binding = Binding::new();
        binding.bind(Arc::from("x"), Term::atom("a"));
        let term = Term::compound("p", vec![Term::var("x"), Term::var("y")]);
        let result = term.substitute(&binding);
        assert_eq!(result, Term::compound("p", vec![Term::atom("a"), Term::var("y")]));
    }

    #[test]
    fn variables_are_deduplicated_in_first_occurrence_order() {
        let term = Term::compound("p", vec![Term::var("x"), Term::var("y"), Term::var("x")]);
        let vars: Vec<String> = term.variables().iter().map(|v| v.to_string()).collect();
        assert_eq!(vars, vec!["x".to_string(), "y".to_string()]);
    }
}
