//! Router: shared lamp states and the pairing rules between the two lamps

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use lamp_proto::{Owner, State};
use tokio::sync::watch;

struct Lamp {
    state: watch::Sender<State>,
    /// Token of the device session currently driving this lamp
    device: Option<u64>,
}

impl Lamp {
    fn new() -> Self {
        Self {
            state: watch::Sender::new(State::NotConnected),
            device: None,
        }
    }

    fn get(&self) -> State {
        *self.state.borrow()
    }

    fn set(&self, state: State) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}

struct Lamps {
    arni: Lamp,
    ian: Lamp,
}

impl Lamps {
    fn get(&self, owner: Owner) -> &Lamp {
        match owner {
            Owner::Arni => &self.arni,
            Owner::Ian => &self.ian,
        }
    }

    fn get_mut(&mut self, owner: Owner) -> &mut Lamp {
        match owner {
            Owner::Arni => &mut self.arni,
            Owner::Ian => &mut self.ian,
        }
    }

    /// Put `owner`'s lamp in `state` and fix up the partner
    fn settle(&self, owner: Owner, state: State) {
        let own = self.get(owner);
        let partner = self.get(owner.partner());

        if state.is_on() && partner.get().is_on() {
            own.set(State::OnPaired);
            partner.set(State::OnPaired);
            return;
        }

        own.set(state);
        if partner.get() == State::OnPaired {
            partner.set(State::OnWaiting);
        }
    }
}

/// Router owns both lamp states
pub struct Router {
    lamps: Mutex<Lamps>,
    next_device: AtomicU64,
}

impl Router {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lamps: Mutex::new(Lamps {
                arni: Lamp::new(),
                ian: Lamp::new(),
            }),
            next_device: AtomicU64::new(1),
        })
    }

    fn lamps(&self) -> MutexGuard<'_, Lamps> {
        self.lamps.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self, owner: Owner) -> State {
        self.lamps().get(owner).get()
    }

    /// Watch `owner`'s lamp state
    pub fn subscribe(&self, owner: Owner) -> watch::Receiver<State> {
        self.lamps().get(owner).state.subscribe()
    }

    /// A lamp connected; it starts switched off. Returns the token to
    /// pass to [`Router::device_disconnected`].
    pub fn device_connected(&self, owner: Owner) -> u64 {
        let token = self.next_device.fetch_add(1, Ordering::Relaxed);
        let mut lamps = self.lamps();
        if lamps.get(owner).device.is_some() {
            tracing::info!(%owner, "replacing connected device");
        }
        lamps.get_mut(owner).device = Some(token);
        lamps.settle(owner, State::Off);
        token
    }

    /// A lamp went away. Ignored if another device took its place since.
    pub fn device_disconnected(&self, owner: Owner, token: u64) {
        let mut lamps = self.lamps();
        if lamps.get(owner).device != Some(token) {
            return;
        }
        lamps.get_mut(owner).device = None;
        lamps.settle(owner, State::NotConnected);
    }

    /// Switch `owner`'s lamp on; returns its new state
    pub fn power_on(&self, owner: Owner) -> State {
        let lamps = self.lamps();
        let current = lamps.get(owner).get();
        if current == State::Off {
            lamps.settle(owner, State::OnWaiting);
        }
        lamps.get(owner).get()
    }

    /// Switch `owner`'s lamp off; returns its new state
    pub fn power_off(&self, owner: Owner) -> State {
        let lamps = self.lamps();
        if lamps.get(owner).get().is_on() {
            lamps.settle(owner, State::Off);
        }
        lamps.get(owner).get()
    }
}
