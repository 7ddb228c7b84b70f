//! # Common Types
//!
//! Component identifiers and the mapping between them and solver variables.

use rustsat::{
    instances::ManageVars,
    types::{Lit, RsHashMap, Var},
};

use crate::Error;

/// An externally numbered system component
pub type Element = i32;

/// A weight or an accumulated cost
pub type Cost = usize;

/// Gets the selector variable for a component. Selectors share the id space
/// of the problem's variables and therefore need to be positive.
///
/// # Errors
///
/// If `el` is not positive, returns [`Error::InvalidSelector`].
pub fn selector_var(el: Element) -> Result<Var, Error> {
    if el <= 0 {
        return Err(Error::InvalidSelector(el));
    }
    Lit::from_ipasir(el)
        .map(Lit::var)
        .map_err(|_| Error::InvalidSelector(el))
}

/// Gets the component of a selector variable
#[must_use]
pub fn selector_element(var: Var) -> Element {
    var.to_ipasir()
}

/// Bidirectional mapping between elements and the variables representing them
/// in a hitting set oracle. Variables are allocated lazily, the first time an
/// element is mapped.
#[derive(Debug, Default, Clone)]
pub struct ElementMap {
    dir: RsHashMap<Element, Var>,
    opp: RsHashMap<Var, Element>,
}

impl ElementMap {
    /// Gets the variable of an element, allocating a fresh one from
    /// `var_manager` if the element has not been seen before. The flag is
    /// `true` if the variable was newly allocated.
    pub fn map(&mut self, el: Element, var_manager: &mut dyn ManageVars) -> (Var, bool) {
        if let Some(&var) = self.dir.get(&el) {
            return (var, false);
        }
        let var = var_manager.new_var();
        self.dir.insert(el, var);
        self.opp.insert(var, el);
        (var, true)
    }

    /// Gets the variable of an element, if it is mapped
    #[must_use]
    pub fn var_of(&self, el: Element) -> Option<Var> {
        self.dir.get(&el).copied()
    }

    /// Gets the element that a variable represents, if any
    #[must_use]
    pub fn element_of(&self, var: Var) -> Option<Element> {
        self.opp.get(&var).copied()
    }

    /// The number of mapped elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.dir.len()
    }

    /// Checks whether no element is mapped
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dir.is_empty()
    }

    /// Removes all mappings
    pub fn clear(&mut self) {
        self.dir.clear();
        self.opp.clear();
    }
}

#[cfg(test)]
mod tests {
    use rustsat::{instances::BasicVarManager, var};

    use super::{selector_element, selector_var, ElementMap};
    use crate::Error;

    #[test]
    fn map_idempotent() {
        let mut vm = BasicVarManager::default();
        let mut map = ElementMap::default();
        let (v1, new1) = map.map(-7, &mut vm);
        let (v2, new2) = map.map(42, &mut vm);
        let (v3, new3) = map.map(-7, &mut vm);
        assert!(new1 && new2 && !new3);
        assert_eq!(v1, v3);
        assert_ne!(v1, v2);
        assert_eq!(map.element_of(v2), Some(42));
        assert_eq!(map.var_of(-7), Some(v1));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn map_clear() {
        let mut vm = BasicVarManager::default();
        let mut map = ElementMap::default();
        let (var, _) = map.map(3, &mut vm);
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.element_of(var), None);
        assert_eq!(map.var_of(3), None);
    }

    #[test]
    fn selectors() {
        assert_eq!(selector_var(1), Ok(var![0]));
        assert_eq!(selector_var(12), Ok(var![11]));
        assert_eq!(selector_element(var![11]), 12);
        assert_eq!(selector_var(0), Err(Error::InvalidSelector(0)));
        assert_eq!(selector_var(-3), Err(Error::InvalidSelector(-3)));
    }
}
