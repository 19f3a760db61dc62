use std::sync::Arc;

use reqwest::header;

use crate::common::{JPEG, MAX_BLOB_SIZE, PNG, TestApp, routes};

mod upload {
    use super::*;

    #[tokio::test]
    async fn owner_can_upload_and_list_a_skin() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let res = app.upload_skin(&token, "  Winter Alex ", PNG, "image/png").await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["display_name"], "Winter Alex");
        assert_eq!(res.body["content_type"], "image/png");
        assert_eq!(res.body["size"], PNG.len());
        assert!(res.body.get("storage_key").is_none());

        let list = app.get_with_token(routes::SKINS, &token).await;
        assert_eq!(list.status, 200);
        assert_eq!(list.body["total"], 1);
        assert_eq!(list.body["limit"], 10);
        assert_eq!(list.body["skins"][0]["id"], res.body["id"]);
    }

    #[tokio::test]
    async fn eleventh_upload_is_rejected_and_leaves_no_file() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        for i in 0..10 {
            app.create_skin(&token, &format!("skin {i}")).await;
        }

        let res = app.upload_skin(&token, "one more", PNG, "image/png").await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "QUOTA_EXCEEDED");
        assert_eq!(app.blob_count().await, 10);

        let list = app.get_with_token(routes::SKINS, &token).await;
        let names: Vec<_> = list.body["skins"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["display_name"].as_str().unwrap().to_string())
            .collect();
        let expected: Vec<_> = (0..10).map(|i| format!("skin {i}")).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn concurrent_uploads_never_exceed_the_limit() {
        let app = Arc::new(TestApp::spawn().await);
        let token = app.create_authenticated_user("alice", "securepass").await;

        for i in 0..8 {
            app.create_skin(&token, &format!("pre {i}")).await;
        }

        let mut handles = Vec::new();
        for i in 0..6 {
            let app = Arc::clone(&app);
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                app.upload_skin(&token, &format!("race {i}"), PNG, "image/png")
                    .await
                    .status
            }));
        }

        let mut statuses = Vec::new();
        for handle in handles {
            statuses.push(handle.await.unwrap());
        }

        assert_eq!(statuses.iter().filter(|&&s| s == 201).count(), 2);
        assert_eq!(statuses.iter().filter(|&&s| s == 409).count(), 4);

        let list = app.get_with_token(routes::SKINS, &token).await;
        assert_eq!(list.body["total"], 10);
        assert_eq!(app.blob_count().await, 10);
    }

    #[tokio::test]
    async fn quota_is_counted_per_user() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice", "securepass").await;
        let bob = app.create_authenticated_user("bob", "securepass").await;

        for i in 0..10 {
            app.create_skin(&alice, &format!("a{i}")).await;
        }

        let res = app.upload_skin(&bob, "mine", PNG, "image/png").await;
        assert_eq!(res.status, 201);
    }

    #[tokio::test]
    async fn non_image_upload_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let res = app
            .upload_skin(&token, "script", b"#!/bin/sh\necho hi", "text/plain")
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert_eq!(app.blob_count().await, 0);
    }

    #[tokio::test]
    async fn content_that_contradicts_declared_type_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let res = app.upload_skin(&token, "liar", JPEG, "image/png").await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let mut big = PNG.to_vec();
        big.resize(MAX_BLOB_SIZE as usize + 1, 0);
        let res = app.upload_skin(&token, "huge", &big, "image/png").await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert_eq!(app.blob_count().await, 0);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let res = app.upload_skin(&token, "   ", PNG, "image/png").await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn upload_without_token_is_rejected() {
        let app = TestApp::spawn().await;

        let form = reqwest::multipart::Form::new().text("name", "x");
        let res = app
            .client
            .post(app.url(routes::SKINS))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(res.status().as_u16(), 401);
    }
}

mod download {
    use super::*;

    #[tokio::test]
    async fn owner_gets_the_exact_bytes() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;
        let id = app.create_skin(&token, "steve").await;

        let res = app.download_skin(&token, id).await;

        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
        assert!(res.headers().contains_key(header::ETAG));
        assert_eq!(res.bytes().await.unwrap().as_ref(), PNG);
    }

    #[tokio::test]
    async fn matching_etag_returns_not_modified() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;
        let id = app.create_skin(&token, "steve").await;

        let first = app.download_skin(&token, id).await;
        let etag = first.headers()[header::ETAG].to_str().unwrap().to_string();

        let res = app
            .client
            .get(app.url(&routes::skin_file(id)))
            .header("Authorization", format!("Bearer {token}"))
            .header(header::IF_NONE_MATCH, etag)
            .send()
            .await
            .unwrap();

        assert_eq!(res.status().as_u16(), 304);
    }

    #[tokio::test]
    async fn other_user_cannot_read_the_file() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice", "securepass").await;
        let bob = app.create_authenticated_user("bob", "securepass").await;
        let id = app.create_skin(&alice, "private").await;

        let res = app.download_skin(&bob, id).await;
        assert_eq!(res.status().as_u16(), 403);

        let meta = app.get_with_token(&routes::skin(id), &bob).await;
        assert_eq!(meta.status, 403);
        assert_eq!(meta.body["code"], "PERMISSION_DENIED");
    }
}

mod edit {
    use super::*;

    #[tokio::test]
    async fn rename_keeps_the_file() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;
        let id = app.create_skin(&token, "old").await;

        let res = app.edit_skin(&token, id, Some("new"), None).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["id"], id);
        assert_eq!(res.body["display_name"], "new");

        let file = app.download_skin(&token, id).await;
        assert_eq!(file.bytes().await.unwrap().as_ref(), PNG);
    }

    #[tokio::test]
    async fn replacing_the_file_keeps_identity() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;
        let id = app.create_skin(&token, "steve").await;

        let res = app
            .edit_skin(&token, id, None, Some((JPEG, "image/jpeg")))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["id"], id);
        assert_eq!(res.body["display_name"], "steve");
        assert_eq!(res.body["content_type"], "image/jpeg");
        assert_eq!(app.blob_count().await, 1);

        let file = app.download_skin(&token, id).await;
        assert_eq!(file.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(file.bytes().await.unwrap().as_ref(), JPEG);
    }

    #[tokio::test]
    async fn oversized_file_leaves_name_untouched() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;
        let id = app.create_skin(&token, "before").await;

        let mut big = PNG.to_vec();
        big.resize(MAX_BLOB_SIZE as usize + 1024, 0);
        let res = app
            .edit_skin(&token, id, Some("after"), Some((&big, "image/png")))
            .await;

        assert_eq!(res.status, 400, "{}", res.text);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");

        let current = app.get_with_token(&routes::skin(id), &token).await;
        assert_eq!(current.body["display_name"], "before");
        assert_eq!(current.body["size"], PNG.len());
    }

    #[tokio::test]
    async fn other_user_cannot_edit() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice", "securepass").await;
        let bob = app.create_authenticated_user("bob", "securepass").await;
        let id = app.create_skin(&alice, "mine").await;

        let res = app
            .edit_skin(&bob, id, Some("stolen"), Some((JPEG, "image/jpeg")))
            .await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");

        let current = app.get_with_token(&routes::skin(id), &alice).await;
        assert_eq!(current.body["display_name"], "mine");
        assert_eq!(current.body["content_type"], "image/png");
    }

    #[tokio::test]
    async fn missing_skin_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;

        let res = app.edit_skin(&token, 9999, Some("ghost"), None).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn owner_can_delete_and_row_and_file_disappear() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;
        let id = app.create_skin(&token, "bye").await;

        let res = app.delete_with_token(&routes::skin(id), &token).await;
        assert_eq!(res.status, 204);

        let list = app.get_with_token(routes::SKINS, &token).await;
        assert_eq!(list.body["total"], 0);
        assert_eq!(app.blob_count().await, 0);

        let again = app.delete_with_token(&routes::skin(id), &token).await;
        assert_eq!(again.status, 404);

        let file = app.download_skin(&token, id).await;
        assert_eq!(file.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn other_user_cannot_delete() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice", "securepass").await;
        let bob = app.create_authenticated_user("bob", "securepass").await;
        let id = app.create_skin(&alice, "mine").await;

        let res = app.delete_with_token(&routes::skin(id), &bob).await;

        assert_eq!(res.status, 403);
        let list = app.get_with_token(routes::SKINS, &alice).await;
        assert_eq!(list.body["total"], 1);
    }

    #[tokio::test]
    async fn deleting_frees_a_quota_slot() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice", "securepass").await;
        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(app.create_skin(&token, &format!("s{i}")).await);
        }

        let res = app.delete_with_token(&routes::skin(ids[3]), &token).await;
        assert_eq!(res.status, 204);

        let res = app.upload_skin(&token, "fresh", PNG, "image/png").await;
        assert_eq!(res.status, 201);
    }
}
