mod identity;
mod server;

pub use identity::{
    IdentityDescriptor, StaffIdentity, IDENTITY_ID_HEADER, IDENTITY_PHONE_HEADER,
    IDENTITY_ROLE_HEADER,
};
pub use server::{
    CreateOrderItemRequest, CreateOrderRequest, CreateOrderResponse, HttpServer,
    HttpServerConfig, UpdateStatusRequest,
};
