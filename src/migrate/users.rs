use futures::TryStreamExt;
use log::info;

use super::report::RunReport;
use crate::error::Result;
use crate::pacing::Pacer;
use crate::providers::gitlab::GlUser;
use crate::providers::GitLabClient;

#[derive(Debug, Clone, Copy)]
pub struct BlockSettings {
    /// Without this only the target list is printed
    pub execute: bool,
    pub pacing: Pacer,
}

/// Block every active, non-admin source account.
///
/// # Errors
///
/// Only when the user listing fails; per-user failures are reported.
pub async fn block_users(
    client: &GitLabClient,
    settings: &BlockSettings,
    report: &mut RunReport,
) -> Result<()> {
    let targets: Vec<GlUser> = client
        .active_users()
        .try_filter(|user| futures::future::ready(user.is_blockable()))
        .try_collect()
        .await?;

    let total = targets.len();
    println!("Targets: {total}");
    for (i, user) in targets.iter().enumerate() {
        println!("[{}/{total}] {} {}", i + 1, user.id, user.username);
    }

    if !settings.execute {
        info!("Dry run: no users will be blocked (pass --execute to block)");
        for user in &targets {
            report.processed(&user.username, Some(user.id), "dry run: would block");
        }
        return Ok(());
    }

    for (i, user) in targets.iter().enumerate() {
        match client.block_user(user.id).await {
            Ok(()) => report.processed(
                &user.username,
                Some(user.id),
                format!("[{}/{total}] blocked", i + 1),
            ),
            Err(e) => report.error(&user.username, Some(user.id), &e),
        }
        settings.pacing.pause().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_client;
    use crate::migrate::report::Status;
    use mockito::Matcher;

    const USERS: &str = r#"[
        {"id": 1, "username": "root", "state": "active", "is_admin": true},
        {"id": 2, "username": "alice", "state": "active"},
        {"id": 3, "username": "bob", "state": "active"}
    ]"#;

    async fn mock_users(server: &mut mockito::Server) {
        server
            .mock("GET", "/api/v4/users")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_body(USERS)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/users")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_body("[]")
            .create_async()
            .await;
    }

    fn client(server: &mockito::Server) -> GitLabClient {
        GitLabClient::from_api(test_client(&format!("{}/api/v4", server.url())))
    }

    #[tokio::test]
    async fn test_dry_run_blocks_nobody() {
        let mut server = mockito::Server::new_async().await;
        mock_users(&mut server).await;
        let block = server
            .mock("POST", Matcher::Regex(r"^/api/v4/users/\d+/block$".into()))
            .expect(0)
            .create_async()
            .await;

        let mut report = RunReport::new();
        let settings = BlockSettings {
            execute: false,
            pacing: Pacer::default(),
        };
        block_users(&client(&server), &settings, &mut report)
            .await
            .unwrap();

        block.assert_async().await;
        assert_eq!(report.records(Status::Processed), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_execute_collects_failures() {
        let mut server = mockito::Server::new_async().await;
        mock_users(&mut server).await;
        let alice = server
            .mock("POST", "/api/v4/users/2/block")
            .with_status(201)
            .with_body("true")
            .create_async()
            .await;
        server
            .mock("POST", "/api/v4/users/3/block")
            .with_status(403)
            .with_body(r#"{"message":"403 Forbidden"}"#)
            .create_async()
            .await;

        let mut report = RunReport::new();
        let settings = BlockSettings {
            execute: true,
            pacing: Pacer::default(),
        };
        block_users(&client(&server), &settings, &mut report)
            .await
            .unwrap();

        alice.assert_async().await;
        assert_eq!(report.records(Status::Processed), vec![2]);
        assert_eq!(report.records(Status::Failed), vec![3]);
        assert_eq!(report.failures().next().unwrap().resource, "bob");
    }
}
