//! Pluggable processing graph behind the mix point.
//!
//! ```text
//! performer A ─┐
//! performer B ─┼─► MixBus (sum) ─► insert ─► insert ─► output quantum
//! performer C ─┘
//! ```
//!
//! The engine drains the graph one render quantum at a time, so the graph may
//! keep internal state (delay lines, envelopes) between quanta. With no
//! inserts the bus is the bypass graph: an unweighted sample-wise sum.

/// Default render quantum in samples.
pub const DEFAULT_RENDER_QUANTUM: usize = 128;

/// A processing graph fed by every performer at once.
pub trait ProcessingGraph: Send {
    /// Sub-block size rendered per call. Must divide the engine block size.
    fn render_quantum(&self) -> usize;

    /// Render one quantum.
    ///
    /// `sources` holds one slice per performer, each exactly
    /// `output.len()` samples long.
    fn render(&mut self, sources: &[&[f32]], output: &mut [f32]);

    /// Clear internal state.
    fn reset(&mut self) {}
}

/// A post-mix processor in the bus insert chain.
pub trait Insert: Send {
    fn name(&self) -> &str;

    /// Process a mixed quantum in place.
    fn process(&mut self, block: &mut [f32]);

    fn reset(&mut self) {}
}

/// Summing mix bus followed by an ordered insert chain.
pub struct MixBus {
    quantum: usize,
    inserts: Vec<Box<dyn Insert>>,
}

impl MixBus {
    /// Bypass bus: plain summation, no inserts.
    pub fn bypass(quantum: usize) -> Self {
        Self {
            quantum,
            inserts: Vec::new(),
        }
    }

    /// Append an insert to the end of the chain.
    pub fn add_insert(&mut self, insert: Box<dyn Insert>) {
        self.inserts.push(insert);
    }

    /// Remove an insert by name.
    pub fn remove_insert(&mut self, name: &str) -> Option<Box<dyn Insert>> {
        let pos = self.inserts.iter().position(|i| i.name() == name)?;
        Some(self.inserts.remove(pos))
    }

    /// Insert names in processing order.
    pub fn insert_names(&self) -> Vec<&str> {
        self.inserts.iter().map(|i| i.name()).collect()
    }

    pub fn is_bypass(&self) -> bool {
        self.inserts.is_empty()
    }
}

impl Default for MixBus {
    fn default() -> Self {
        Self::bypass(DEFAULT_RENDER_QUANTUM)
    }
}

impl ProcessingGraph for MixBus {
    fn render_quantum(&self) -> usize {
        self.quantum
    }

    fn render(&mut self, sources: &[&[f32]], output: &mut [f32]) {
        output.fill(0.0);
        for source in sources {
            for (out, &s) in output.iter_mut().zip(source.iter()) {
                *out += s;
            }
        }
        for insert in &mut self.inserts {
            insert.process(output);
        }
    }

    fn reset(&mut self) {
        for insert in &mut self.inserts {
            insert.reset();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Linear gain insert for exercising the chain.
    pub(crate) struct Gain {
        pub name: String,
        pub factor: f32,
    }

    impl Insert for Gain {
        fn name(&self) -> &str {
            &self.name
        }

        fn process(&mut self, block: &mut [f32]) {
            for s in block.iter_mut() {
                *s *= self.factor;
            }
        }
    }

    #[test]
    fn test_bypass_sums_sources() {
        let mut bus = MixBus::bypass(4);
        let a = [0.1, 0.2, 0.3, 0.4];
        let b = [0.5, 0.5, -0.3, 0.0];
        let mut out = [9.0; 4];

        bus.render(&[&a, &b], &mut out);

        let expected = [0.6, 0.7, 0.0, 0.4];
        for (o, e) in out.iter().zip(expected.iter()) {
            assert!((o - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_no_clipping_guard() {
        let mut bus = MixBus::bypass(2);
        let loud = [0.9, -0.9];
        let mut out = [0.0; 2];
        bus.render(&[&loud, &loud, &loud], &mut out);
        assert!((out[0] - 2.7).abs() < 1e-5);
        assert!((out[1] + 2.7).abs() < 1e-5);
    }

    #[test]
    fn test_no_sources_renders_silence() {
        let mut bus = MixBus::default();
        let mut out = vec![1.0; DEFAULT_RENDER_QUANTUM];
        bus.render(&[], &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_insert_chain_order_and_removal() {
        let mut bus = MixBus::bypass(2);
        bus.add_insert(Box::new(Gain { name: "half".into(), factor: 0.5 }));
        bus.add_insert(Box::new(Gain { name: "triple".into(), factor: 3.0 }));
        assert_eq!(bus.insert_names(), vec!["half", "triple"]);
        assert!(!bus.is_bypass());

        let src = [1.0, -1.0];
        let mut out = [0.0; 2];
        bus.render(&[&src], &mut out);
        assert!((out[0] - 1.5).abs() < 1e-6);

        assert!(bus.remove_insert("half").is_some());
        assert!(bus.remove_insert("half").is_none());
        bus.render(&[&src], &mut out);
        assert!((out[0] - 3.0).abs() < 1e-6);
    }
}
