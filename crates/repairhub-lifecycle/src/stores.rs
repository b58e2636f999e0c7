//! The lifecycle, pricing and payment repositories as one bundle.

use repairhub_core::repository::{
    DeviceRepository, LabPaymentRepository, LabPriceRepository, RepairRepository,
    RepairTypeRepository, ReplacementRepository, WarrantyRepository,
};

/// Access to the device, warranty, repair and replacement tables, the
/// repair-type catalog, lab prices and lab payments.
pub trait LifecycleStores: Send + Sync {
    type Devices: DeviceRepository;
    type Warranties: WarrantyRepository;
    type Repairs: RepairRepository;
    type Replacements: ReplacementRepository;
    type RepairTypes: RepairTypeRepository;
    type Prices: LabPriceRepository;
    type Payments: LabPaymentRepository;

    fn devices(&self) -> &Self::Devices;
    fn warranties(&self) -> &Self::Warranties;
    fn repairs(&self) -> &Self::Repairs;
    fn replacements(&self) -> &Self::Replacements;
    fn repair_types(&self) -> &Self::RepairTypes;
    fn prices(&self) -> &Self::Prices;
    fn payments(&self) -> &Self::Payments;
}

/// Plain bundle of the seven repositories.
#[derive(Debug, Clone)]
pub struct Stores<D, W, R, Q, T, L, P> {
    pub devices: D,
    pub warranties: W,
    pub repairs: R,
    pub replacements: Q,
    pub repair_types: T,
    pub prices: L,
    pub payments: P,
}

/// Every table served by one store type.
pub type SharedStores<S> = Stores<S, S, S, S, S, S, S>;

impl<S: Clone> SharedStores<S> {
    /// One value serving every table.
    pub fn shared(store: S) -> Self {
        Self {
            devices: store.clone(),
            warranties: store.clone(),
            repairs: store.clone(),
            replacements: store.clone(),
            repair_types: store.clone(),
            prices: store.clone(),
            payments: store,
        }
    }
}

impl<D, W, R, Q, T, L, P> LifecycleStores for Stores<D, W, R, Q, T, L, P>
where
    D: DeviceRepository,
    W: WarrantyRepository,
    R: RepairRepository,
    Q: ReplacementRepository,
    T: RepairTypeRepository,
    L: LabPriceRepository,
    P: LabPaymentRepository,
{
    type Devices = D;
    type Warranties = W;
    type Repairs = R;
    type Replacements = Q;
    type RepairTypes = T;
    type Prices = L;
    type Payments = P;

    fn devices(&self) -> &D {
        &self.devices
    }

    fn warranties(&self) -> &W {
        &self.warranties
    }

    fn repairs(&self) -> &R {
        &self.repairs
    }

    fn replacements(&self) -> &Q {
        &self.replacements
    }

    fn repair_types(&self) -> &T {
        &self.repair_types
    }

    fn prices(&self) -> &L {
        &self.prices
    }

    fn payments(&self) -> &P {
        &self.payments
    }
}
