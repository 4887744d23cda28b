use crate::config::LedgerConfig;
use crate::error::ValidationError;
use crate::geo::distance_km;
use crate::hospital::HospitalRegistry;
use crate::transaction::Transaction;

pub struct TransferValidator;

impl TransferValidator {
    /// **Admission rule for a single transfer**
    ///
    /// SAFETY: Checks run in a fixed order and the first failure wins:
    /// 1. The stored hash matches the transaction's fields
    /// 2. Both hospitals exist
    /// 3. Neither is blacklisted
    /// 4. Sender holds enough units of the requested type
    /// 5. Sender credit meets the configured floor
    /// 6. The hospitals are within the permitted radius
    ///
    /// Never mutates `registry`. Returns the transfer distance on success.
    pub fn validate(
        tx: &Transaction,
        registry: &HospitalRegistry,
        config: &LedgerConfig,
    ) -> Result<f64, ValidationError> {
        if !tx.verify_hash() {
            log::warn!("Transfer {} fails its hash check", tx.id);
            return Err(ValidationError::HashMismatch(tx.id.clone()));
        }
        if tx.quantity == 0 {
            return Err(ValidationError::InvalidQuantity(0));
        }

        let sender = registry
            .get(&tx.sender)
            .ok_or_else(|| ValidationError::UnknownHospital(tx.sender.clone()))?;
        let receiver = registry
            .get(&tx.receiver)
            .ok_or_else(|| ValidationError::UnknownHospital(tx.receiver.clone()))?;

        if sender.blacklisted {
            return Err(ValidationError::Blacklisted(sender.id.clone()));
        }
        if receiver.blacklisted {
            return Err(ValidationError::Blacklisted(receiver.id.clone()));
        }

        let available = sender.units_of(&tx.blood_type);
        let requested = u64::from(tx.quantity);
        if available < requested {
            return Err(ValidationError::InsufficientInventory {
                hospital_id: sender.id.clone(),
                blood_type: tx.blood_type.clone(),
                available,
                requested,
            });
        }

        if sender.credit < config.min_transfer_credit {
            return Err(ValidationError::InsufficientCredit {
                hospital_id: sender.id.clone(),
                credit: sender.credit,
                required: config.min_transfer_credit,
            });
        }

        let distance = distance_km(sender.location, receiver.location);
        if distance > config.max_transfer_distance_km {
            return Err(ValidationError::DistanceExceeded {
                distance_km: distance,
                max_km: config.max_transfer_distance_km,
            });
        }

        log::debug!(
            "Transfer {} validated: {} -> {} ({:.2}km)",
            tx.id,
            tx.sender,
            tx.receiver,
            distance
        );
        Ok(distance)
    }
}
