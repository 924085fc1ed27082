/// HTTP access to the users/transfers API.
pub mod api;
pub mod client;

pub use api::BankingApi;
pub use client::{
    ApiResponse, ClientConfig, ErrorBody, LoginRequest, LoginResponse, LoginUser, MessageBody,
    RegisterRequest, Transfer, TransferApi, TransferRequest, User,
};
