pub mod event;
pub mod money;
pub mod payment;
pub mod promo_code;
pub mod reservation;
pub mod revenue;

pub use event::{Event, NewEvent};
pub use payment::{Payment, PaymentStatus};
pub use promo_code::PromoCode;
pub use reservation::{Reservation, ReservationStatus};
pub use revenue::OrganizerRevenue;
