use std::sync::Arc;

use integration_tests::TestMarket;
use rm_core::error::MarketError;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_buyers_one_winner() {
    let t = TestMarket::new();
    t.seed_user("alice", "alicepass", 1_000).await;
    t.seed_user("dave", "davepass", 1_000).await;
    t.seed_user("bob", "bobpass1", 0).await;
    let item = t.list("bob", "Guitar", 600).await;

    let market = Arc::clone(&t.market.marketplace);
    let other = Arc::clone(&t.market.marketplace);
    let (a, b) = tokio::join!(
        tokio::spawn(async move { market.purchase(item.id, "alice").await }),
        tokio::spawn(async move { other.purchase(item.id, "dave").await }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser, MarketError::AlreadySold));

    let alice = t.user("alice").await.balance;
    let dave = t.user("dave").await.balance;
    assert_eq!(alice + dave, 1_400);
    assert_eq!(t.user("bob").await.balance, 600);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contended_purchases_conserve_money() {
    let t = TestMarket::new();
    t.seed_user("bob", "bobpass1", 0).await;
    let mut items = Vec::new();
    for i in 0..5 {
        items.push(t.list("bob", &format!("Item {i}"), 100).await.id);
    }
    let buyers = ["alice", "carol", "dave", "erin"];
    for name in buyers {
        t.seed_user(name, "password", 1_000).await;
    }

    let mut handles = Vec::new();
    for name in buyers {
        for id in items.clone() {
            let market = Arc::clone(&t.market.marketplace);
            handles.push(tokio::spawn(async move { market.purchase(id, name).await }));
        }
    }
    let mut sold = 0u64;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => sold += 1,
            // contention past the retry budget is allowed; partial commits are not
            Err(MarketError::AlreadySold | MarketError::Conflict) => {}
            Err(other) => panic!("unexpected purchase failure: {other}"),
        }
    }
    assert!(sold >= 1 && sold <= items.len() as u64);

    let bob = t.user("bob").await.balance;
    assert_eq!(bob, sold * 100);
    let mut total = bob;
    for name in buyers {
        let bought = t.market.marketplace.purchases_of(name).await.unwrap().len() as u64;
        let balance = t.user(name).await.balance;
        assert_eq!(balance, 1_000 - bought * 100);
        total += balance;
    }
    assert_eq!(total, 4 * 1_000);
}
