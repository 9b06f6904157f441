use specta_typescript::{BigIntExportBehavior, Typescript};
use tauri_specta::{collect_commands, collect_events, Builder};

use crate::events::{ModelDownloadStateChanged, ServiceStateChanged};

/// Where debug builds write the generated TypeScript bindings
pub const BINDINGS_PATH: &str = "../src/bindings.ts";

/// Collects every command and event for the invoke handler and the TypeScript export.
pub fn builder() -> Builder<tauri::Wry> {
    let builder = Builder::<tauri::Wry>::new()
        .commands(crate::with_commands!(collect_commands))
        .events(collect_events![ModelDownloadStateChanged, ServiceStateChanged]);

    #[cfg(debug_assertions)] // <- Only export on non-release builds
    export(&builder, BINDINGS_PATH);

    builder
}

pub fn export(builder: &Builder<tauri::Wry>, path: &str) {
    // u64 byte counts stay below 2^53, so `number` is safe
    let typescript = Typescript::default().bigint(BigIntExportBehavior::Number);
    if let Err(e) = builder.export(typescript, path) {
        log::error!("Failed to export TypeScript bindings to {}: {}", path, e);
    }
}
