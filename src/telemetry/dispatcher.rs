//! Path to callback routing for incoming parameter messages

use super::Callback;

struct Route {
    pattern: String,
    wildcard: bool,
    callback: Callback,
}

impl Route {
    fn matches(&self, path: &str) -> bool {
        if self.wildcard {
            path.starts_with(self.pattern.as_str())
        } else {
            path == self.pattern
        }
    }
}

/// Ordered list of `(pattern, callback)` routes
#[derive(Default)]
pub struct Dispatcher {
    routes: Vec<Route>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for an exact path, or a path prefix when `wildcard`
    pub fn map(&mut self, pattern: &str, callback: Callback, wildcard: bool) {
        self.routes.push(Route {
            pattern: pattern.to_string(),
            wildcard,
            callback,
        });
    }

    /// Invoke every matching callback in registration order
    ///
    /// Returns the number of callbacks invoked.
    pub fn dispatch(&self, path: &str, value: f32) -> usize {
        let mut hits = 0;
        for route in self.routes.iter().filter(|r| r.matches(path)) {
            (route.callback)(path, value);
            hits += 1;
        }
        hits
    }

    /// Registered patterns, wildcards suffixed with `*`, without repeats
    pub fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = Vec::new();
        for route in &self.routes {
            let pattern = if route.wildcard {
                format!("{}*", route.pattern)
            } else {
                route.pattern.clone()
            };
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder() -> (Callback, Arc<Mutex<Vec<(String, f32)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: Callback = Arc::new(move |path: &str, value: f32| {
            sink.lock().push((path.to_string(), value));
        });
        (callback, seen)
    }

    #[test]
    fn test_exact_and_wildcard() {
        let mut dispatcher = Dispatcher::new();
        let (exact, exact_seen) = recorder();
        let (prefix, prefix_seen) = recorder();
        dispatcher.map("/avatar/parameters/haptX-headTop", exact, false);
        dispatcher.map("/avatar/parameters/haptX-", prefix, true);

        assert_eq!(dispatcher.dispatch("/avatar/parameters/haptX-headTop", 0.5), 2);
        assert_eq!(dispatcher.dispatch("/avatar/parameters/haptX-chestL", 0.1), 1);
        assert_eq!(dispatcher.dispatch("/avatar/parameters/VelocityX", 3.0), 0);

        assert_eq!(exact_seen.lock().len(), 1);
        assert_eq!(
            *prefix_seen.lock(),
            vec![
                ("/avatar/parameters/haptX-headTop".to_string(), 0.5),
                ("/avatar/parameters/haptX-chestL".to_string(), 0.1),
            ]
        );
    }

    #[test]
    fn test_exact_does_not_match_prefix() {
        let mut dispatcher = Dispatcher::new();
        let (callback, seen) = recorder();
        dispatcher.map("/a/b", callback, false);
        assert_eq!(dispatcher.dispatch("/a/bc", 1.0), 0);
        assert!(seen.lock().is_empty());
        assert_eq!(dispatcher.patterns(), vec!["/a/b"]);
    }

    #[test]
    fn test_patterns_mark_wildcards_once() {
        let mut dispatcher = Dispatcher::new();
        let (a, _) = recorder();
        let (b, _) = recorder();
        dispatcher.map("/avatar/parameters/haptX-", a, true);
        dispatcher.map("/avatar/parameters/haptX-", b, true);
        dispatcher.map("/avatar/change", recorder().0, false);
        assert_eq!(
            dispatcher.patterns(),
            vec!["/avatar/parameters/haptX-*", "/avatar/change"]
        );
    }
}
