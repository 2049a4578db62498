use log::Level;
use std::time::Instant;

/// Times sections of work and logs how long they took on its log target.
/// Components that need timing own one; there is no global switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tracer {
    target: &'static str,
    enabled: bool,
}

impl Tracer {
    pub fn new(target: &'static str) -> Self {
        Tracer {
            target,
            enabled: true,
        }
    }

    pub fn disabled(target: &'static str) -> Self {
        Tracer {
            target,
            enabled: false,
        }
    }

    pub fn time<T>(&self, what: &str, f: impl FnOnce() -> T) -> T {
        if !self.enabled || !log::log_enabled!(target: self.target, Level::Debug) {
            return f();
        }
        let start = Instant::now();
        let result = f();
        log::debug!(
            target: self.target,
            "{} took {:.3} seconds",
            what,
            start.elapsed().as_secs_f64()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_returns_the_result() {
        assert_eq!(Tracer::new("test").time("adding", || 1 + 1), 2);
        assert_eq!(Tracer::disabled("test").time("adding", || 2 + 2), 4);
    }
}
