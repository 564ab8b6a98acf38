//! Synthetic client fingerprint stamped on every upstream call.

use common::configuration::Device;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::info;

const CPU_LABELS: &[&str] = &["AMD", "Intel"];
const BRANDS: &[&str] = &["92L3", "91C9", "814S", "8P15V", "35G4", "65G4", "55G4"];
const OS_FAMILIES: &[&str] = &["windows"];
const OS_VERSIONS: &[&str] = &["10.0.19045", "10.0.22621", "10.0.22631", "10.0.26100"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub cpu: String,
    /// Random 63-bit integer in decimal
    pub device_id: String,
    /// 32 random bytes in hex
    pub machine_id: String,
    pub brand: String,
    pub device_type: String,
    pub os_version: String,
}

fn pick<'a>(rng: &mut StdRng, choices: &[&'a str]) -> &'a str {
    choices[rng.random_range(0..choices.len())]
}

impl DeviceIdentity {
    fn generate(rng: &mut StdRng) -> Self {
        let mut machine_id = [0u8; 32];
        rng.fill(&mut machine_id);
        DeviceIdentity {
            cpu: pick(rng, CPU_LABELS).to_string(),
            device_id: (rng.random::<u64>() >> 1).to_string(),
            machine_id: hex::encode(machine_id),
            brand: pick(rng, BRANDS).to_string(),
            device_type: pick(rng, OS_FAMILIES).to_string(),
            os_version: pick(rng, OS_VERSIONS).to_string(),
        }
    }
}

struct Slot {
    identity: DeviceIdentity,
    uses: u32,
    limit: u32,
}

struct RotatorState {
    rng: StdRng,
    current: Option<Slot>,
}

pub struct DeviceRotator {
    state: Mutex<RotatorState>,
    rotate: bool,
    base_use_limit: u32,
    use_limit_jitter: u32,
}

impl DeviceRotator {
    pub fn new(config: &Device) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    pub fn with_rng(config: &Device, rng: StdRng) -> Self {
        Self {
            state: Mutex::new(RotatorState { rng, current: None }),
            rotate: config.rotate,
            base_use_limit: config.base_use_limit.max(1),
            use_limit_jitter: config.use_limit_jitter,
        }
    }

    fn draw_limit(&self, rng: &mut StdRng) -> u32 {
        if !self.rotate {
            return u32::MAX;
        }
        let jitter = if self.use_limit_jitter > 0 {
            rng.random_range(0..self.use_limit_jitter)
        } else {
            0
        };
        self.base_use_limit + jitter
    }

    /// Charges one use against the current identity and returns it,
    /// replacing the identity first when its use limit is reached.
    pub async fn current_identity(&self) -> DeviceIdentity {
        let mut state = self.state.lock().await;
        let RotatorState { rng, current } = &mut *state;

        let slot = match current.take() {
            Some(slot) if slot.uses < slot.limit => slot,
            _ => {
                let identity = DeviceIdentity::generate(rng);
                let limit = self.draw_limit(rng);
                info!(
                    device_id = %identity.device_id,
                    brand = %identity.brand,
                    use_limit = limit,
                    "generated device identity"
                );
                Slot {
                    identity,
                    uses: 0,
                    limit,
                }
            }
        };
        let slot = current.insert(slot);
        slot.uses += 1;
        slot.identity.clone()
    }

    /// `(uses, limit)` of the current identity
    pub async fn usage(&self) -> Option<(u32, u32)> {
        let state = self.state.lock().await;
        state.current.as_ref().map(|slot| (slot.uses, slot.limit))
    }
}
