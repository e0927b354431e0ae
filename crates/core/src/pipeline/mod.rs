pub mod control;
pub mod session_logger;
pub mod track_sessions_use_case;
