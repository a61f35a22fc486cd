//! Cart validation, payment-session creation and payment verification.

mod idempotency;
mod session;
mod validator;
mod verify;

pub use idempotency::{bucket, idempotency_key};
pub use session::{
    CheckoutSession, METADATA_VALUE_MAX_CHARS, build_session_params, create_checkout_session,
};
pub use validator::{
    CartItem, CustomerContact, MAX_CART_ITEMS, MAX_QUANTITY, ValidatedCart, ValidatedLineItem,
    validate_cart,
};
pub use verify::{PaymentVerification, verify_payment};
