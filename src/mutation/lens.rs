//! Projections from a whole state into a sub-region.

use std::fmt;
use std::sync::Arc;

type Getter<S, T> = Arc<dyn Fn(&S) -> &T + Send + Sync>;
type GetterMut<S, T> = Arc<dyn Fn(&mut S) -> &mut T + Send + Sync>;

/// A pair of pure projections: shared and exclusive access to the same
/// sub-region of `S`.
///
/// Build one with [`Lens::new`] or the [`lens!`](crate::lens) macro.
pub struct Lens<S, T> {
    get: Getter<S, T>,
    get_mut: GetterMut<S, T>,
}

impl<S: 'static, T: 'static> Lens<S, T> {
    pub fn new<G, M>(get: G, get_mut: M) -> Self
    where
        G: Fn(&S) -> &T + Send + Sync + 'static,
        M: Fn(&mut S) -> &mut T + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            get_mut: Arc::new(get_mut),
        }
    }

    /// Narrow further into `T`.
    pub fn then<U: 'static>(&self, next: &Lens<T, U>) -> Lens<S, U> {
        let (outer, inner) = (Arc::clone(&self.get), Arc::clone(&next.get));
        let (outer_mut, inner_mut) = (Arc::clone(&self.get_mut), Arc::clone(&next.get_mut));
        Lens::new(
            move |s: &S| inner(outer(s)),
            move |s: &mut S| inner_mut(outer_mut(s)),
        )
    }
}

impl<S: 'static> Lens<S, S> {
    pub fn identity() -> Self {
        Lens::new(|s: &S| s, |s: &mut S| s)
    }
}

impl<S, T> Lens<S, T> {
    pub fn get<'a>(&self, state: &'a S) -> &'a T {
        (self.get)(state)
    }

    pub fn get_mut<'a>(&self, state: &'a mut S) -> &'a mut T {
        (self.get_mut)(state)
    }
}

impl<S, T> Clone for Lens<S, T> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            get_mut: Arc::clone(&self.get_mut),
        }
    }
}

impl<S, T> fmt::Debug for Lens<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lens<{}, {}>",
            std::any::type_name::<S>(),
            std::any::type_name::<T>()
        )
    }
}

/// Build a [`Lens`] from a field path.
///
/// ```ignore
/// let lens = lens!(AppState, settings.theme);
/// ```
#[macro_export]
macro_rules! lens {
    ($ty:ty, $($field:tt).+) => {
        $crate::Lens::new(
            |s: &$ty| &s.$($field).+,
            |s: &mut $ty| &mut s.$($field).+,
        )
    };
}
