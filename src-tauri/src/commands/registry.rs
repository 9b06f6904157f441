/// Single source of truth for all commands
/// This macro takes a wrapper macro path and applies it to the command list
#[macro_export]
macro_rules! with_commands {
    ($($wrapper:tt)*) => {
        $($wrapper)*![
            // Service lifecycle
            $crate::commands::start_service,
            $crate::commands::stop_service,
            $crate::commands::service_status,
            $crate::commands::load_model,
            $crate::commands::release_model,
            $crate::commands::model_status,
            $crate::commands::get_service_state,
            $crate::commands::get_loading_flags,
            // Model files
            $crate::commands::check_model_files,
            $crate::commands::download_model,
            $crate::commands::cancel_model_download,
            // Chat sessions
            $crate::commands::chat_sessions_load,
            $crate::commands::chat_sessions_save,
            $crate::commands::chat_sessions_list,
            $crate::commands::chat_sessions_delete,
            $crate::commands::chat_sessions_get_storage_info,
            $crate::commands::chat_sessions_ensure_storage_directory,
            $crate::commands::chat_sessions_update_order,
            // Backend pass-through
            $crate::commands::videorag_upload_video,
            $crate::commands::videorag_get_status,
            $crate::commands::videorag_query,
            $crate::commands::videorag_system_status,
            $crate::commands::videorag_delete_session,
            $crate::commands::videorag_forward,
            // Settings
            $crate::commands::load_app_settings,
            $crate::commands::save_app_settings,
            $crate::commands::save_remote_api_key,
            $crate::commands::delete_remote_api_key,
            $crate::commands::has_remote_api_key,
        ]
    };
}
