//! Broad-phase collision detection over fat AABB proxies.
//!
//! Each fixture child registers a proxy whose AABB is inflated by a margin
//! and stretched along the body's motion, so the proxy only needs to be
//! refit when the shape escapes its fat box. Pair management is incremental:
//! only proxies that moved since the last update can produce new pairs.

use log::trace;

use crate::body::BodyId;
use crate::collision::Aabb;
use crate::math::Vec2;
use crate::settings::{AABB_EXTENSION, AABB_MULTIPLIER};

pub type ProxyId = usize;

const NULL_PROXY: ProxyId = usize::MAX;

/// Identifies the fixture child a proxy stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProxyData {
    pub body: BodyId,
    pub fixture: usize,
    pub child: usize,
}

#[derive(Clone, Copy, Debug)]
struct Proxy {
    aabb: Aabb,
    data: ProxyData,
    moved: bool,
}

#[derive(Default)]
pub struct BroadPhase {
    proxies: Vec<Option<Proxy>>,
    free_list: Vec<ProxyId>,
    move_buffer: Vec<ProxyId>,
    pair_buffer: Vec<(ProxyId, ProxyId)>,
}

impl BroadPhase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a proxy with a fattened AABB. The proxy is buffered as moved
    /// so the next pair update picks it up.
    pub fn create_proxy(&mut self, aabb: &Aabb, data: ProxyData) -> ProxyId {
        let r = Vec2::splat(AABB_EXTENSION);
        let proxy = Proxy {
            aabb: Aabb::new(aabb.lower_bound - r, aabb.upper_bound + r),
            data,
            moved: true,
        };

        let id = match self.free_list.pop() {
            Some(id) => {
                self.proxies[id] = Some(proxy);
                id
            }
            None => {
                self.proxies.push(Some(proxy));
                self.proxies.len() - 1
            }
        };

        trace!("broad-phase: create proxy {} for {:?}", id, data);
        self.move_buffer.push(id);
        id
    }

    pub fn destroy_proxy(&mut self, id: ProxyId) {
        debug_assert!(self.proxies[id].is_some());
        self.unbuffer_move(id);
        self.proxies[id] = None;
        self.free_list.push(id);
    }

    /// Refit a proxy for a new tight AABB. Returns true if the fat AABB had
    /// to grow, which re-buffers the proxy for pair generation.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: &Aabb, displacement: Vec2) -> bool {
        let proxy = self.proxies[id].as_mut().unwrap_or_else(|| {
            panic!("broad-phase: moved stale proxy {}", id)
        });

        if proxy.aabb.contains(aabb) {
            return false;
        }

        // Extend along the motion so fast bodies do not refit every step.
        let r = Vec2::splat(AABB_EXTENSION);
        let mut fat = Aabb::new(aabb.lower_bound - r, aabb.upper_bound + r);

        let d = AABB_MULTIPLIER * displacement;
        if d.x < 0.0 {
            fat.lower_bound.x += d.x;
        } else {
            fat.upper_bound.x += d.x;
        }
        if d.y < 0.0 {
            fat.lower_bound.y += d.y;
        } else {
            fat.upper_bound.y += d.y;
        }

        proxy.aabb = fat;
        if !proxy.moved {
            proxy.moved = true;
            self.move_buffer.push(id);
        }
        true
    }

    /// Force a proxy to participate in the next pair update, for example
    /// after a filter change.
    pub fn touch_proxy(&mut self, id: ProxyId) {
        let proxy = self.proxies[id].as_mut().expect("touched stale proxy");
        if !proxy.moved {
            proxy.moved = true;
            self.move_buffer.push(id);
        }
    }

    pub fn get_fat_aabb(&self, id: ProxyId) -> &Aabb {
        &self.proxies[id].as_ref().expect("stale proxy").aabb
    }

    pub fn get_proxy_data(&self, id: ProxyId) -> ProxyData {
        self.proxies[id].as_ref().expect("stale proxy").data
    }

    /// Fat-AABB overlap between two live proxies.
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        match (&self.proxies[a], &self.proxies[b]) {
            (Some(pa), Some(pb)) => pa.aabb.overlaps(&pb.aabb),
            _ => false,
        }
    }

    /// Visit all live proxies whose fat AABB overlaps the query box.
    pub fn query(&self, aabb: &Aabb, mut callback: impl FnMut(ProxyId, ProxyData)) {
        for (id, slot) in self.proxies.iter().enumerate() {
            if let Some(proxy) = slot {
                if proxy.aabb.overlaps(aabb) {
                    callback(id, proxy.data);
                }
            }
        }
    }

    /// Generate overlap pairs for proxies that moved since the last call.
    /// Each new pair is reported exactly once per update, lower proxy id
    /// first.
    pub fn update_pairs(&mut self, mut callback: impl FnMut(ProxyData, ProxyData)) {
        self.pair_buffer.clear();

        for i in 0..self.move_buffer.len() {
            let query_id = self.move_buffer[i];
            if query_id == NULL_PROXY {
                continue;
            }
            let Some(query_proxy) = self.proxies[query_id] else {
                continue;
            };

            for (other_id, slot) in self.proxies.iter().enumerate() {
                if other_id == query_id {
                    continue;
                }
                let Some(other) = slot else { continue };

                // A pair of moved proxies is found twice; keep the copy
                // where the moved proxy has the lower id.
                if other.moved && other_id > query_id {
                    continue;
                }

                if query_proxy.aabb.overlaps(&other.aabb) {
                    let pair = if query_id < other_id {
                        (query_id, other_id)
                    } else {
                        (other_id, query_id)
                    };
                    self.pair_buffer.push(pair);
                }
            }
        }

        for id in self.move_buffer.drain(..) {
            if id != NULL_PROXY {
                if let Some(proxy) = self.proxies[id].as_mut() {
                    proxy.moved = false;
                }
            }
        }

        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for i in 0..self.pair_buffer.len() {
            let (a, b) = self.pair_buffer[i];
            let (Some(pa), Some(pb)) = (&self.proxies[a], &self.proxies[b]) else {
                continue;
            };
            callback(pa.data, pb.data);
        }
    }

    fn unbuffer_move(&mut self, id: ProxyId) {
        for slot in self.move_buffer.iter_mut() {
            if *slot == id {
                *slot = NULL_PROXY;
            }
        }
    }

    #[cfg(test)]
    pub fn proxy_count(&self) -> usize {
        self.proxies.iter().filter(|p| p.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(body: usize) -> ProxyData {
        ProxyData {
            body: BodyId(body),
            fixture: 0,
            child: 0,
        }
    }

    fn unit_aabb_at(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x - 0.5, y - 0.5), Vec2::new(x + 0.5, y + 0.5))
    }

    fn collect_pairs(bp: &mut BroadPhase) -> Vec<(BodyId, BodyId)> {
        let mut pairs = Vec::new();
        bp.update_pairs(|a, b| pairs.push((a.body, b.body)));
        pairs
    }

    #[test]
    fn overlapping_proxies_pair_once() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(&unit_aabb_at(0.0, 0.0), data(0));
        bp.create_proxy(&unit_aabb_at(0.5, 0.0), data(1));

        let pairs = collect_pairs(&mut bp);
        assert_eq!(pairs.len(), 1);

        // No motion, no new pairs.
        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn distant_proxies_do_not_pair() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(&unit_aabb_at(0.0, 0.0), data(0));
        bp.create_proxy(&unit_aabb_at(10.0, 0.0), data(1));

        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn small_motion_stays_inside_fat_aabb() {
        let mut bp = BroadPhase::new();
        let id = bp.create_proxy(&unit_aabb_at(0.0, 0.0), data(0));
        let _ = collect_pairs(&mut bp);

        // Within the fattening margin: no refit.
        let refit = bp.move_proxy(id, &unit_aabb_at(0.05, 0.0), Vec2::new(0.05, 0.0));
        assert!(!refit);

        // Escaping the fat box forces a refit.
        let refit = bp.move_proxy(id, &unit_aabb_at(1.0, 0.0), Vec2::new(0.95, 0.0));
        assert!(refit);
    }

    #[test]
    fn moving_into_overlap_emits_pair() {
        let mut bp = BroadPhase::new();
        let id = bp.create_proxy(&unit_aabb_at(0.0, 0.0), data(0));
        bp.create_proxy(&unit_aabb_at(5.0, 0.0), data(1));
        assert!(collect_pairs(&mut bp).is_empty());

        bp.move_proxy(id, &unit_aabb_at(4.3, 0.0), Vec2::new(4.3, 0.0));
        let pairs = collect_pairs(&mut bp);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn destroyed_proxy_is_skipped_and_slot_reused() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&unit_aabb_at(0.0, 0.0), data(0));
        bp.create_proxy(&unit_aabb_at(0.5, 0.0), data(1));

        bp.destroy_proxy(a);
        assert!(collect_pairs(&mut bp).is_empty());

        let c = bp.create_proxy(&unit_aabb_at(0.5, 0.5), data(2));
        assert_eq!(c, a);
        assert_eq!(bp.proxy_count(), 2);
        assert_eq!(collect_pairs(&mut bp).len(), 1);
    }

    #[test]
    fn touch_proxy_reissues_pairs() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&unit_aabb_at(0.0, 0.0), data(0));
        bp.create_proxy(&unit_aabb_at(0.5, 0.0), data(1));
        let _ = collect_pairs(&mut bp);

        bp.touch_proxy(a);
        assert_eq!(collect_pairs(&mut bp).len(), 1);
    }
}
