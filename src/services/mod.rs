pub mod cash_service;
pub mod position_service;
pub mod risk_recalc;
