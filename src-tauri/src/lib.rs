pub mod bindings;
mod commands;
mod config;
mod events;
mod keychain;
mod logging;
mod setup;

pub fn run() {
    let specta_builder = bindings::builder();

    tauri::Builder::default()
        .plugin(logging::create_plugin().build())
        .plugin(tauri_plugin_store::Builder::default().build())
        .invoke_handler(specta_builder.invoke_handler())
        .setup(move |app| {
            specta_builder.mount_events(app.handle());
            setup::setup_app(app)
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            // Don't leave a spawned Python backend behind
            if let tauri::RunEvent::Exit = event {
                setup::shutdown(app);
            }
        });
}
