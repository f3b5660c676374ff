//! Fill-if-default merge.
//!
//! A field of the stored entity is written only while it still holds its
//! default sentinel, and only with a non-default draft value. Values that are
//! already established are never regressed by a later, noisier scrape.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::ConfigurationError;
use crate::models::{Cpu, Gpu, HardwareEntity, IsDefault, ModelKey, Motherboard};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub fields_filled: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.fields_filled > 0
    }
}

/// Writes `value` into `slot` if `slot` is unset and `value` is not.
pub fn fill_if_default<T: IsDefault>(slot: &mut T, value: T) -> bool {
    if slot.is_default() && !value.is_default() {
        *slot = value;
        true
    } else {
        false
    }
}

macro_rules! fill_fields {
    ($target:expr, $draft:expr; $($field:ident),+ $(,)?) => {{
        let mut filled = 0usize;
        $(
            if fill_if_default(&mut $target.$field, $draft.$field) {
                filled += 1;
            }
        )+
        filled
    }};
}

fn merge_cpu(target: &mut Cpu, draft: Cpu) -> usize {
    fill_fields!(target, draft;
        model_name, manufacturer, part_number, cores, threads, base_clock_ghz,
        boost_clock_ghz, l3_cache_mb, tdp_watts, socket, memory_types, integrated_graphics,
    )
}

fn merge_gpu(target: &mut Gpu, draft: Gpu) -> usize {
    fill_fields!(target, draft;
        model_name, manufacturer, part_number, chipset, memory_size_gb, memory_type,
        memory_bus_bits, boost_clock_mhz, tdp_watts, length_mm, recommended_psu_watts,
        power_connectors, outputs,
    )
}

fn merge_motherboard(target: &mut Motherboard, draft: Motherboard) -> usize {
    fill_fields!(target, draft;
        model_name, manufacturer, part_number, socket, chipset, form_factor, memory_slots,
        max_memory_gb, memory_types, m2_slots, sata_ports, usb_ports,
    )
}

/// Applies `draft` onto `target` field by field. Both must be the same
/// category; anything else is a wiring bug in the caller.
pub fn merge(target: &mut HardwareEntity, draft: HardwareEntity) -> Result<MergeOutcome, ConfigurationError> {
    let fields_filled = match (target, draft) {
        (HardwareEntity::Cpu(t), HardwareEntity::Cpu(d)) => merge_cpu(t, d),
        (HardwareEntity::Gpu(t), HardwareEntity::Gpu(d)) => merge_gpu(t, d),
        (HardwareEntity::Motherboard(t), HardwareEntity::Motherboard(d)) => merge_motherboard(t, d),
        (t, d) => {
            return Err(ConfigurationError::CategoryMismatch {
                expected: t.category().as_str(),
                found: d.category().as_str(),
            });
        }
    };
    Ok(MergeOutcome { fields_filled })
}

// ── Per-key serialization ─────────────────────────────────────────────────────

/// One async mutex per model key: at most one find → merge → upsert in flight
/// for any entity. Entries are dropped again once no caller holds or awaits them.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<ModelKey, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held for the duration of one merge; releases and prunes its key on drop.
pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: ModelKey,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.owner.entries();
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<ModelKey, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn lock(&self, key: &ModelKey) -> KeyGuard<'_> {
        let lock = Arc::clone(self.entries().entry(key.clone()).or_default());
        KeyGuard {
            owner: self,
            key: key.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FormFactor, HardwareCategory, RawSpecMap, UsbKind, UsbPort};
    use crate::normalize::normalize;
    use std::time::Duration;

    fn stored_cpu() -> HardwareEntity {
        HardwareEntity::Cpu(Cpu {
            model_name: "AMD Ryzen 7 7800X3D".into(),
            manufacturer: "AMD".into(),
            cores: 8,
            socket: "AM5".into(),
            ..Default::default()
        })
    }

    fn draft_cpu() -> HardwareEntity {
        HardwareEntity::Cpu(Cpu {
            model_name: "AMD Ryzen 7 7800X3D".into(),
            manufacturer: "AMD".into(),
            cores: 16,
            socket: "".into(),
            threads: 16,
            memory_types: vec!["DDR5".into()],
            ..Default::default()
        })
    }

    #[test]
    fn test_monotonic_fill_keeps_established_values() {
        let mut target = stored_cpu();
        merge(&mut target, draft_cpu()).unwrap();

        let HardwareEntity::Cpu(cpu) = target else { unreachable!() };
        assert_eq!(cpu.cores, 8, "non-default field must not be overwritten");
        assert_eq!(cpu.socket, "AM5", "blank draft value must not clear a field");
    }

    #[test]
    fn test_fill_forward_sets_default_fields() {
        let mut target = stored_cpu();
        let outcome = merge(&mut target, draft_cpu()).unwrap();

        let HardwareEntity::Cpu(cpu) = target else { unreachable!() };
        assert_eq!(cpu.threads, 16);
        assert_eq!(cpu.memory_types, vec!["DDR5".to_string()]);
        assert_eq!(outcome.fields_filled, 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut raw = RawSpecMap::with_title("MSI MAG B650 TOMAHAWK WIFI");
        raw.insert("Form Factor", vec!["ATX".into()]);
        raw.insert("Memory Types", vec!["DDR5".into()]);
        raw.insert("USB", vec!["2 x USB 3.2 Gen 2 Type-A".into()]);
        let draft = normalize(HardwareCategory::Motherboard, &raw).unwrap();

        let mut once = HardwareEntity::empty(HardwareCategory::Motherboard);
        merge(&mut once, draft.clone()).unwrap();

        let mut twice = once.clone();
        let second = merge(&mut twice, draft).unwrap();

        assert_eq!(once, twice);
        assert!(!second.changed());

        let HardwareEntity::Motherboard(board) = twice else { unreachable!() };
        assert_eq!(board.form_factor, FormFactor::Atx);
        assert_eq!(
            board.usb_ports,
            vec![UsbPort { kind: UsbKind::TypeA, version: "3.2 Gen 2".into(), quantity: 2 }]
        );
    }

    #[test]
    fn test_every_default_field_is_filled_from_a_full_draft() {
        let full = Gpu {
            model_name: "RTX 4070".into(),
            manufacturer: "NVIDIA".into(),
            part_number: "900-1G141".into(),
            chipset: "AD104".into(),
            memory_size_gb: 12.0,
            memory_type: "GDDR6X".into(),
            memory_bus_bits: 192,
            boost_clock_mhz: 2475.0,
            tdp_watts: 200,
            length_mm: 244.0,
            recommended_psu_watts: 650,
            power_connectors: vec![crate::models::PowerConnector {
                kind: crate::models::PowerConnectorKind::Pin16,
                quantity: 1,
            }],
            outputs: vec!["HDMI 2.1a".into()],
        };
        let mut target = HardwareEntity::empty(HardwareCategory::Gpu);
        let outcome = merge(&mut target, HardwareEntity::Gpu(full.clone())).unwrap();

        assert_eq!(target, HardwareEntity::Gpu(full));
        assert_eq!(outcome.fields_filled, 13);
    }

    #[test]
    fn test_category_mismatch_is_configuration_error() {
        let mut target = stored_cpu();
        let err = merge(&mut target, HardwareEntity::empty(HardwareCategory::Gpu)).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::CategoryMismatch { expected: "cpu", found: "gpu" }
        );
    }

    #[test]
    fn test_keyed_locks_prune_released_keys() {
        let locks = KeyedLocks::new();
        let key = ModelKey::new(HardwareCategory::Gpu, "NVIDIA", "RTX 4070").unwrap();
        let other = ModelKey::new(HardwareCategory::Gpu, "AMD", "RX 7800 XT").unwrap();

        tokio_test::block_on(async {
            let held = locks.lock(&key).await;
            drop(locks.lock(&other).await);
            assert_eq!(locks.len(), 1);

            drop(held);
            assert!(locks.is_empty());

            drop(locks.lock(&key).await);
        });

        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_keyed_locks_serialize_same_key() {
        let locks = Arc::new(KeyedLocks::new());
        let key = ModelKey::new(HardwareCategory::Cpu, "AMD", "Ryzen 5 7600").unwrap();
        let other = ModelKey::new(HardwareCategory::Cpu, "Intel", "Core i5-14600K").unwrap();

        let guard = locks.lock(&key).await;

        // a different key is not blocked
        let _other_guard = tokio::time::timeout(Duration::from_millis(50), locks.lock(&other))
            .await
            .expect("independent key must not wait");

        // the same key waits until the first guard drops
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.lock(&key)).await;
        assert!(blocked.is_err());

        drop(guard);
        let _again = tokio::time::timeout(Duration::from_millis(50), locks.lock(&key))
            .await
            .expect("lock released");
        assert_eq!(locks.len(), 2);
    }
}
