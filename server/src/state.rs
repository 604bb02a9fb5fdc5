// server/src/state.rs

use crate::config::AppConfig;
use crate::services::auth_service::Authorizer;
use payconfirm::PaymentServices;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub services: PaymentServices,
  pub config: Arc<AppConfig>,
  pub authorizer: Arc<dyn Authorizer>,
}
