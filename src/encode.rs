//! Mapping between places and BDD variables.
//!
//! Each place gets a pair of adjacent variables, current state first:
//! place `p` is variable `2p+1` in the current frame and `2p+2` in the next
//! frame. Interleaving the frames keeps related variables close in the order,
//! which keeps the transition relation small.

use crate::net::{Marking, PetriNet, PlaceId};

#[derive(Debug, Clone)]
pub struct VarEncoding {
    num_places: usize,
}

impl VarEncoding {
    pub fn new(net: &PetriNet) -> Self {
        Self {
            num_places: net.num_places(),
        }
    }

    pub fn num_places(&self) -> usize {
        self.num_places
    }

    /// Total number of BDD variables (current and next frame).
    pub fn num_vars(&self) -> usize {
        2 * self.num_places
    }

    /// Current-frame variable of place `p`.
    pub fn current(&self, p: PlaceId) -> u32 {
        debug_assert!(p.0 < self.num_places);
        (2 * p.0 + 1) as u32
    }

    /// Next-frame variable of place `p`.
    pub fn next(&self, p: PlaceId) -> u32 {
        debug_assert!(p.0 < self.num_places);
        (2 * p.0 + 2) as u32
    }

    /// Place of a current-frame variable, if `v` is one.
    pub fn place_of_current(&self, v: u32) -> Option<PlaceId> {
        if v % 2 == 1 && ((v - 1) / 2) < self.num_places as u32 {
            Some(PlaceId(((v - 1) / 2) as usize))
        } else {
            None
        }
    }

    pub fn current_vars(&self) -> impl Iterator<Item = u32> {
        let n = self.num_places;
        (0..n).map(|p| (2 * p + 1) as u32)
    }

    pub fn next_vars(&self) -> impl Iterator<Item = u32> {
        let n = self.num_places;
        (0..n).map(|p| (2 * p + 2) as u32)
    }

    /// The marking as a full cube over the current-frame variables.
    pub fn marking_cube(&self, m: &Marking) -> Vec<i32> {
        assert_eq!(m.num_places(), self.num_places);
        (0..self.num_places)
            .map(|p| {
                let v = self.current(PlaceId(p)) as i32;
                if m.is_marked(PlaceId(p)) {
                    v
                } else {
                    -v
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::PetriNet;

    fn three_place_net() -> PetriNet {
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_place("p3").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net
    }

    #[test]
    fn test_interleaved_pairs() {
        let net = three_place_net();
        let enc = VarEncoding::new(&net);

        assert_eq!(enc.num_vars(), 6);
        assert_eq!(enc.current(PlaceId(0)), 1);
        assert_eq!(enc.next(PlaceId(0)), 2);
        assert_eq!(enc.current(PlaceId(2)), 5);
        assert_eq!(enc.next(PlaceId(2)), 6);

        assert_eq!(enc.current_vars().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(enc.next_vars().collect::<Vec<_>>(), vec![2, 4, 6]);
    }

    #[test]
    fn test_place_of_current() {
        let net = three_place_net();
        let enc = VarEncoding::new(&net);

        assert_eq!(enc.place_of_current(1), Some(PlaceId(0)));
        assert_eq!(enc.place_of_current(5), Some(PlaceId(2)));
        assert_eq!(enc.place_of_current(2), None);
        assert_eq!(enc.place_of_current(7), None);
    }

    #[test]
    fn test_marking_cube() {
        let net = three_place_net();
        let enc = VarEncoding::new(&net);

        let mut m = net.initial_marking();
        m.set(PlaceId(1), true);
        assert_eq!(enc.marking_cube(&m), vec![-1, 3, -5]);
    }
}
