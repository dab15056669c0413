//! Read-only occupation access with a small mutation overlay.

/// Occupation view used during delta evaluation.
///
/// Evaluators are stateless with respect to the occupation: the caller
/// passes the occupation by reference and delta evaluation layers proposed
/// changes on top through this view instead of mutating the vector. The
/// overlay stays tiny (the handful of sites touched by one event), so a
/// linear scan beats a hash map.
#[derive(Debug)]
pub struct OccView<'a> {
    occupation: &'a [u8],
    overlay: Vec<(usize, u8)>,
}

impl<'a> OccView<'a> {
    /// Creates a view with an empty overlay.
    pub fn new(occupation: &'a [u8]) -> Self {
        Self {
            occupation,
            overlay: Vec::new(),
        }
    }

    /// Occupant at site `l`, overlay first.
    #[inline]
    pub fn get(&self, l: usize) -> u8 {
        for &(site, occ) in &self.overlay {
            if site == l {
                return occ;
            }
        }
        self.occupation[l]
    }

    /// Overlays `occ` at site `l`.
    pub fn set(&mut self, l: usize, occ: u8) {
        for entry in &mut self.overlay {
            if entry.0 == l {
                entry.1 = occ;
                return;
            }
        }
        self.overlay.push((l, occ));
    }

    /// Number of underlying sites.
    pub fn len(&self) -> usize {
        self.occupation.len()
    }

    /// True if the underlying occupation is empty.
    pub fn is_empty(&self) -> bool {
        self.occupation.is_empty()
    }
}
