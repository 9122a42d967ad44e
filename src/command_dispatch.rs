//! Purpose: Hold top-level CLI command dispatch for `csvserve`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: `check` exits with the code of the first failing table, 0 otherwise.

use super::*;
use crate::table_json::{check_json, tables_json};

pub(super) fn dispatch_command(
    command: Command,
    service: TableService,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "csvserve", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Tables => {
            let tables = service.list_tables()?;
            emit_json(tables_json(&tables, service.exposed().names()));
            Ok(RunOutcome::ok())
        }
        Command::Check { json } => {
            let results: Vec<(String, Result<usize, Error>)> = service
                .exposed()
                .names()
                .iter()
                .map(|table| (table.clone(), service.load(table).map(|loaded| loaded.len())))
                .collect();

            if json {
                let reports = results
                    .iter()
                    .map(|(table, result)| check_json(table, result))
                    .collect::<Vec<_>>();
                emit_json(serde_json::json!({ "reports": reports }));
            } else {
                for (table, result) in &results {
                    match result {
                        Ok(rows) => println!("OK: {table} rows={rows}"),
                        Err(err) => println!("FAIL: {table} {err}"),
                    }
                }
            }

            let exit_code = results
                .iter()
                .find_map(|(_, result)| result.as_ref().err())
                .map_or(0, |err| to_exit_code(err.kind()));
            Ok(RunOutcome::with_code(exit_code))
        }
        Command::Serve(args) => {
            let config = serve_config_from_args(args, &service)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
    }
}
