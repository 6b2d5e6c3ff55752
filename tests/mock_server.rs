use mongo_mock_server::{
    go, AutoIsMaster, MockServer, OpClass, Pattern, PatternDoc, ReplySpec, ServerOptions,
};
use futures_util::stream::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Client;
use std::time::Duration;

async fn start_server() -> (MockServer, String) {
    let options = ServerOptions::builder()
        .auto_ismaster(AutoIsMaster::Document(
            doc! { "ok": 1, "ismaster": true, "minWireVersion": 0, "maxWireVersion": 6 },
        ))
        .request_timeout_secs(5)
        .build();
    let server = MockServer::new(options);
    let address = server.run().await.expect("server should bind");
    let uri = format!("mongodb://{address}/?directConnection=true");
    (server, uri)
}

#[tokio::test]
async fn handshake_is_autoresponded() -> anyhow::Result<()> {
    let (server, uri) = start_server().await;
    let _client = Client::with_uri_str(&uri).await?;

    // Connecting alone is enough to trigger the driver's monitoring
    // handshake; it must never reach the inbox.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let result = server.receives(None, Some(Duration::from_millis(300))).await;
    assert!(result.is_err(), "handshake traffic should not reach the inbox");

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn insert_round_trip_replies_ok() -> anyhow::Result<()> {
    let (server, uri) = start_server().await;
    let client = Client::with_uri_str(&uri).await?;
    let coll = client.database("db").collection::<mongodb::bson::Document>("coll");

    let insert = go(async move { coll.insert_one(doc! { "_id": 1 }).await });

    let request = server
        .receives(
            Some(
                Pattern::new()
                    .op_class(OpClass::Command)
                    .namespace("db")
                    .document(PatternDoc::new().field("insert", "coll")),
            ),
            None,
        )
        .await?;
    request.reply(ReplySpec::ok()).await?;

    let result = insert.join().await?;
    assert_eq!(result.inserted_id, mongodb::bson::Bson::Int32(1));

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn command_error_surfaces_to_the_client() -> anyhow::Result<()> {
    let (server, uri) = start_server().await;
    let client = Client::with_uri_str(&uri).await?;
    let coll = client.database("db").collection::<mongodb::bson::Document>("coll");

    let insert = go(async move { coll.insert_one(doc! { "_id": 1 }).await });

    let request = server
        .receives(
            Some(
                Pattern::new()
                    .op_class(OpClass::Command)
                    .document(PatternDoc::new().field("insert", "coll")),
            ),
            None,
        )
        .await?;
    request.command_err(11000, "E11000 duplicate key error", None).await?;

    let result = insert.join().await;
    assert!(result.is_err(), "duplicate key error should fail the insert");

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn hangup_surfaces_as_a_network_error_and_server_stays_up() -> anyhow::Result<()> {
    let (server, uri) = start_server().await;
    let client = Client::with_uri_str(&uri).await?;
    let coll = client.database("db").collection::<mongodb::bson::Document>("coll");

    let insert = go(async move { coll.insert_one(doc! { "_id": 1 }).await });

    let request = server
        .receives(
            Some(
                Pattern::new()
                    .op_class(OpClass::Command)
                    .document(PatternDoc::new().field("insert", "coll")),
            ),
            None,
        )
        .await?;
    request.hangup().await;

    let result = insert.join().await;
    assert!(result.is_err());
    assert_eq!(server.state(), mongo_mock_server::ServerState::Running);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn cursor_survives_a_getmore_round_trip() -> anyhow::Result<()> {
    let (server, uri) = start_server().await;
    let client = Client::with_uri_str(&uri).await?;
    let coll = client.database("db").collection::<mongodb::bson::Document>("coll");

    let find = go(async move {
        let mut cursor = coll.find(doc! {}).batch_size(2).await?;
        let mut docs = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            docs.push(doc);
        }
        Ok::<_, mongodb::error::Error>(docs)
    });

    let find_request = server
        .receives(
            Some(
                Pattern::new()
                    .op_class(OpClass::Command)
                    .document(PatternDoc::new().field("find", "coll")),
            ),
            None,
        )
        .await?;
    find_request
        .reply(doc! {
            "ok": 1,
            "cursor": {
                "id": 123i64,
                "ns": "db.coll",
                "firstBatch": [{ "_id": 1 }, { "_id": 2 }],
            },
        })
        .await?;

    let get_more_request = server
        .receives(
            Some(
                Pattern::new()
                    .op_class(OpClass::Command)
                    .document(PatternDoc::new().field("getMore", bson::Bson::Int64(123))),
            ),
            None,
        )
        .await?;
    get_more_request
        .reply(doc! {
            "ok": 1,
            "cursor": {
                "id": 0i64,
                "ns": "db.coll",
                "nextBatch": [{ "_id": 3 }, { "_id": 4 }],
            },
        })
        .await?;

    let docs = find.join().await?;
    assert_eq!(docs.len(), 4);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn autoresponder_precedence_uses_the_most_recently_registered() -> anyhow::Result<()> {
    let options = ServerOptions::builder()
        .auto_ismaster(AutoIsMaster::Disabled)
        .build();
    let server = MockServer::new(options);
    let address = server.run().await?;
    let uri = format!("mongodb://{address}/?directConnection=true");

    server.autoresponds(
        Pattern::command_ci("ismaster"),
        doc! { "ok": 1, "ismaster": true, "maxWireVersion": 3 },
    );
    server.autoresponds(
        Pattern::command_ci("ismaster"),
        doc! { "ok": 1, "ismaster": true, "maxWireVersion": 6 },
    );

    let _client = Client::with_uri_str(&uri).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // No request should have reached the inbox; the most recently registered
    // handshake responder is the one the driver's handshake saw.
    let result = server.receives(None, Some(Duration::from_millis(300))).await;
    assert!(result.is_err());

    server.stop().await;
    Ok(())
}
