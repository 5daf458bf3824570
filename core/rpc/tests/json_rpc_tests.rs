// JSON-RPC client against a local mock node

use blockfill_rpc::{BlockSource, HeightMethod, JsonRpcClient, RpcClientConfig, RpcError};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;

async fn handle(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let body = hyper::body::to_bytes(req.into_body()).await.unwrap_or_default();
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let id = request["id"].clone();

    let reply = match request["method"].as_str() {
        Some("getlatestblockheight") => json!({"jsonrpc": "2.0", "result": 120, "id": id}),
        Some("getblockcount") => json!({"jsonrpc": "2.0", "result": "0x79", "id": id}),
        Some("getblock") => {
            let height = request["params"]["height"].as_u64().unwrap_or(0);
            if height == 13 {
                json!({"jsonrpc": "2.0", "error": {"code": -5, "message": "block not found"}, "id": id})
            } else {
                json!({"jsonrpc": "2.0", "result": {"height": height, "txs": []}, "id": id})
            }
        }
        _ => json!({"jsonrpc": "2.0", "error": {"code": -32601, "message": "method not found"}, "id": id}),
    };

    Ok(Response::new(Body::from(reply.to_string())))
}

async fn spawn_mock_node() -> SocketAddr {
    let make_svc = make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(handle)) });
    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

fn client_for(addr: SocketAddr, height_method: HeightMethod) -> JsonRpcClient {
    JsonRpcClient::new(&RpcClientConfig {
        url: format!("http://{}", addr),
        request_timeout_secs: 5,
        height_method,
    })
    .unwrap()
}

#[cfg(test)]
mod json_rpc_tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_height() {
        let addr = spawn_mock_node().await;
        let client = client_for(addr, HeightMethod::GetLatestBlockHeight);
        assert_eq!(client.latest_height().await.unwrap(), 120);
    }

    #[tokio::test]
    async fn test_block_count_method_with_hex_result() {
        let addr = spawn_mock_node().await;
        let client = client_for(addr, HeightMethod::GetBlockCount);
        assert_eq!(client.latest_height().await.unwrap(), 121);
    }

    #[tokio::test]
    async fn test_fetch_block_returns_result_payload() {
        let addr = spawn_mock_node().await;
        let client = client_for(addr, HeightMethod::GetLatestBlockHeight);

        let payload = client.fetch_block(7).await.unwrap();
        let decoded: Value = serde_json::from_slice(payload.as_bytes()).unwrap();
        assert_eq!(decoded["height"], 7);
    }

    #[tokio::test]
    async fn test_remote_error_is_surfaced() {
        let addr = spawn_mock_node().await;
        let client = client_for(addr, HeightMethod::GetLatestBlockHeight);

        match client.fetch_block(13).await {
            Err(RpcError::Remote { code, message }) => {
                assert_eq!(code, -5);
                assert_eq!(message, "block not found");
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let client = client_for(addr, HeightMethod::GetLatestBlockHeight);

        let err = client.latest_height().await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_) | RpcError::Timeout));
    }
}
