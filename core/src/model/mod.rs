// core/src/model/mod.rs

pub mod confirmation;
pub mod event;
pub mod order;
pub mod processor;
pub mod refund;
pub mod staff;
pub mod system_error;

pub use confirmation::{ConfirmationRequest, ConfirmationResult, Reason};
pub use event::{EventKey, ProcessedEvent, Reservation};
pub use order::{ConfirmedVia, Order, OrderStatus, PaymentStamp, ReconcileWindow, UnknownStatus};
pub use processor::{CheckoutStatus, NewTerminalCheckout, PaymentState, ProcessorPayment, TerminalCheckout};
pub use refund::{LoyaltyUpdate, RefundLock, VoucherRecord};
pub use staff::{CompAudit, PaymentMethod, StaffPrincipal, StaffRole, StatusChangeRequest};
pub use system_error::{Severity, SystemError, SystemErrorType};
