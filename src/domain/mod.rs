// Domain layer: shipment/quote models and ports (carrier adapters, storage).

pub mod model;
pub mod ports;
