//! Controller presence tracking
//!
//! Keeps the list of connected controllers, activates the action set on every controller
//! that shows up and notices when they all go away.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::controller::provider::{ActionSetHandle, ControllerHandle, InputProvider};

/// Outcome of one monitor tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// No controller connected
    Searching(Vec<ControllerHandle>),
    /// Controllers just appeared and were activated; output starts next tick
    Acquired(Vec<ControllerHandle>),
    /// Connected, this controller drives output
    Active(ControllerHandle),
    /// Revalidation found no controllers left
    Lost,
}

#[derive(Debug)]
enum Link {
    Disconnected,
    Connected {
        controllers: Vec<ControllerHandle>,
        checked_at: Instant,
    },
}

#[derive(Debug)]
pub struct ConnectionMonitor {
    action_set: ActionSetHandle,
    revalidate_interval: Duration,
    link: Link,
}

impl ConnectionMonitor {
    pub fn new(action_set: ActionSetHandle, revalidate_interval: Duration) -> Self {
        Self {
            action_set,
            revalidate_interval,
            link: Link::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Connected { .. })
    }

    /// Controllers currently known, primary first
    pub fn controllers(&self) -> &[ControllerHandle] {
        match &self.link {
            Link::Connected { controllers, .. } => controllers,
            Link::Disconnected => &[],
        }
    }

    pub fn tick(&mut self, provider: &mut dyn InputProvider, now: Instant) -> Presence {
        match &mut self.link {
            Link::Disconnected => {
                let controllers = provider.connected_controllers();
                if controllers.is_empty() {
                    return Presence::Searching(controllers);
                }

                info!("{} controller(s) connected", controllers.len());
                for controller in &controllers {
                    provider.activate_action_set(*controller, self.action_set);
                }
                self.link = Link::Connected {
                    controllers: controllers.clone(),
                    checked_at: now,
                };
                Presence::Acquired(controllers)
            }
            Link::Connected {
                controllers,
                checked_at,
            } => {
                if now.duration_since(*checked_at) >= self.revalidate_interval {
                    let fresh = provider.connected_controllers();
                    *checked_at = now;

                    if fresh.is_empty() {
                        warn!("All controllers disconnected");
                        self.link = Link::Disconnected;
                        return Presence::Lost;
                    }

                    for controller in fresh.iter().filter(|c| !controllers.contains(c)) {
                        info!("New controller {} connected", controller);
                        provider.activate_action_set(*controller, self.action_set);
                    }
                    if fresh != *controllers {
                        debug!("Controller list changed: {:?} -> {:?}", controllers, fresh);
                        *controllers = fresh;
                    }
                }

                match controllers.first() {
                    Some(primary) => Presence::Active(*primary),
                    None => {
                        self.link = Link::Disconnected;
                        Presence::Lost
                    }
                }
            }
        }
    }

    /// A frame read in which every fetch failed; start searching again
    pub fn mark_lost(&mut self) {
        if self.is_connected() {
            warn!("Primary controller stopped answering, reconnecting");
            self.link = Link::Disconnected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::provider::testing::ScriptedProvider;

    const REVALIDATE: Duration = Duration::from_millis(500);

    fn monitor(provider: &ScriptedProvider) -> ConnectionMonitor {
        ConnectionMonitor::new(provider.set_handle(), REVALIDATE)
    }

    #[test]
    fn searches_while_nothing_is_connected() {
        let mut provider = ScriptedProvider::new();
        let mut monitor = monitor(&provider);
        let now = Instant::now();

        assert_eq!(monitor.tick(&mut provider, now), Presence::Searching(vec![]));
        assert_eq!(monitor.tick(&mut provider, now), Presence::Searching(vec![]));
        assert_eq!(provider.state().controller_queries, 2);
        assert!(!monitor.is_connected());
    }

    #[test]
    fn activates_each_new_controller_exactly_once() {
        let mut provider = ScriptedProvider::new();
        let mut monitor = monitor(&provider);
        let start = Instant::now();

        monitor.tick(&mut provider, start);
        provider.set_controllers(&[1, 2]);

        let presence = monitor.tick(&mut provider, start);
        assert_eq!(
            presence,
            Presence::Acquired(vec![ControllerHandle(1), ControllerHandle(2)])
        );

        // Unchanged set across several revalidations
        for step in 1..=4 {
            let presence = monitor.tick(&mut provider, start + REVALIDATE * step);
            assert_eq!(presence, Presence::Active(ControllerHandle(1)));
        }

        let set = provider.set_handle();
        assert_eq!(
            provider.state().activations,
            vec![(ControllerHandle(1), set), (ControllerHandle(2), set)]
        );
    }

    #[test]
    fn list_is_only_requeried_after_the_interval() {
        let mut provider = ScriptedProvider::new();
        provider.set_controllers(&[4]);
        let mut monitor = monitor(&provider);
        let start = Instant::now();

        monitor.tick(&mut provider, start);
        for ms in [4, 8, 100, 499] {
            monitor.tick(&mut provider, start + Duration::from_millis(ms));
        }
        assert_eq!(provider.state().controller_queries, 1);

        monitor.tick(&mut provider, start + REVALIDATE);
        assert_eq!(provider.state().controller_queries, 2);
    }

    #[test]
    fn revalidation_activates_late_arrivals_and_adopts_the_list() {
        let mut provider = ScriptedProvider::new();
        provider.set_controllers(&[1]);
        let mut monitor = monitor(&provider);
        let start = Instant::now();
        monitor.tick(&mut provider, start);

        provider.set_controllers(&[2, 1]);
        let presence = monitor.tick(&mut provider, start + REVALIDATE);

        assert_eq!(presence, Presence::Active(ControllerHandle(2)));
        assert_eq!(
            monitor.controllers(),
            &[ControllerHandle(2), ControllerHandle(1)]
        );
        let set = provider.set_handle();
        assert_eq!(
            provider.state().activations,
            vec![(ControllerHandle(1), set), (ControllerHandle(2), set)]
        );
    }

    #[test]
    fn empty_revalidation_is_lost() {
        let mut provider = ScriptedProvider::new();
        provider.set_controllers(&[1]);
        let mut monitor = monitor(&provider);
        let start = Instant::now();
        monitor.tick(&mut provider, start);

        provider.set_controllers(&[]);
        assert_eq!(
            monitor.tick(&mut provider, start + REVALIDATE),
            Presence::Lost
        );
        assert!(!monitor.is_connected());
        assert!(monitor.controllers().is_empty());
    }

    #[test]
    fn mark_lost_reactivates_on_reconnect() {
        let mut provider = ScriptedProvider::new();
        provider.set_controllers(&[1]);
        let mut monitor = monitor(&provider);
        let now = Instant::now();
        monitor.tick(&mut provider, now);

        monitor.mark_lost();
        assert!(!monitor.is_connected());

        let presence = monitor.tick(&mut provider, now);
        assert_eq!(presence, Presence::Acquired(vec![ControllerHandle(1)]));
        assert_eq!(provider.state().activations.len(), 2);
    }
}
