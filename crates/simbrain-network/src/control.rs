//! Cooperative run/stop control and a lockable network handle for drivers
//! that tick from one thread while another thread edits or observes.

use crate::network::Network;
use crate::Result;
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared run flag, checked between ticks only
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    running: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request a stop; the tick in progress completes
    pub fn stop(&self) {
        self.set_running(false);
    }
}

/// A network behind a mutex. Every tick and every edit takes the lock once,
/// so structural edits land between ticks.
#[derive(Debug, Clone)]
pub struct SharedNetwork {
    network: Arc<Mutex<Network>>,
    control: RunControl,
}

impl SharedNetwork {
    pub fn new(network: Network) -> Self {
        let control = network.run_control();
        Self {
            network: Arc::new(Mutex::new(network)),
            control,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Network> {
        self.network.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn step(&self) -> Result<()> {
        self.lock().step()
    }

    /// Apply an edit between ticks
    pub fn edit<R>(&self, f: impl FnOnce(&mut Network) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn read<R>(&self, f: impl FnOnce(&Network) -> R) -> R {
        f(&self.lock())
    }

    pub fn run_control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    /// Tick until stopped or until `max_ticks`, releasing the lock between
    /// ticks. Returns the number of completed ticks.
    pub fn run(&self, max_ticks: Option<u64>) -> Result<u64> {
        self.control.set_running(true);
        info!("Shared network run started");
        let mut completed = 0;
        while self.control.is_running() && max_ticks.map_or(true, |max| completed < max) {
            if let Err(err) = self.step() {
                self.control.stop();
                return Err(err);
            }
            completed += 1;
        }
        self.control.stop();
        info!("Shared network run stopped after {} tick(s)", completed);
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::NeuronRule;
    use std::thread;

    #[test]
    fn test_run_control_clones_share_state() {
        let control = RunControl::new();
        let other = control.clone();
        assert!(!control.is_running());
        other.set_running(true);
        assert!(control.is_running());
        control.stop();
        assert!(!other.is_running());
    }

    #[test]
    fn test_shared_network_edits_between_ticks() {
        let shared = SharedNetwork::new(Network::new());
        let a = shared.edit(|net| net.add_neuron(NeuronRule::default()));
        shared.step().unwrap();
        let b = shared.edit(|net| net.add_neuron(NeuronRule::default()));
        shared.edit(|net| net.add_synapse(a, b, 0.5)).unwrap();

        assert_eq!(shared.read(|net| net.tick_count()), 1);
        assert_eq!(shared.read(|net| net.synapse_count()), 1);
    }

    #[test]
    fn test_stop_from_another_thread() {
        let shared = SharedNetwork::new(Network::new());
        shared.edit(|net| net.add_neuron(NeuronRule::default()));
        let driver = shared.clone();
        let handle = thread::spawn(move || driver.run(None));

        // Wait until the driver has made progress, then stop it
        while shared.read(|net| net.tick_count()) < 3 {
            thread::yield_now();
        }
        shared.stop();
        let ticks = handle.join().unwrap().unwrap();
        assert!(ticks >= 3);
        assert_eq!(shared.read(|net| net.tick_count()), ticks);
    }

    #[test]
    fn test_network_and_handle_share_control() {
        let net = Network::new();
        let control = net.run_control();
        let shared = SharedNetwork::new(net);
        control.set_running(true);
        assert!(shared.is_running());
    }
}
