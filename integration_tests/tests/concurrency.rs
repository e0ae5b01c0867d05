mod common;

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use world_core::{
    InMemoryGeoIndex, MapObject, ObjectEvent, ObjectId, SharedGrid, TerritoryId, Tile, TileType,
};

#[test]
fn racing_adds_of_one_id_admit_a_single_winner() {
    common::init_tracing();
    let directory = common::directory_over(Arc::new(InMemoryGeoIndex::new()), 500, 500);
    let events = directory.subscribe();
    let winners = AtomicUsize::new(0);

    thread::scope(|scope| {
        for worker in 0..8u32 {
            let directory = &directory;
            let winners = &winners;
            scope.spawn(move || {
                let object = MapObject::new(ObjectId(77), worker * 10, worker * 10, 1, 1);
                if directory.try_add(object) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(directory.len(), 1);
    assert!(matches!(events.try_recv(), Some(ObjectEvent::Added(_))));
    assert_eq!(events.try_recv(), None);
}

#[test]
fn parallel_writers_and_readers_keep_directory_and_index_aligned() {
    common::init_tracing();
    let index = Arc::new(InMemoryGeoIndex::new());
    let directory = common::directory_over(index.clone(), 1000, 1000);
    let events = directory.subscribe();

    thread::scope(|scope| {
        for worker in 0..4u64 {
            let directory = &directory;
            scope.spawn(move || {
                for n in 0..100u64 {
                    let id = ObjectId(worker * 1_000 + n);
                    let x = ((worker * 250) + n) as u32;
                    assert!(directory.try_add(MapObject::new(id, x, 500, 1, 1)));
                    if n % 2 == 0 {
                        assert!(directory.try_remove(id));
                    }
                }
            });
        }
        for _ in 0..2 {
            let directory = &directory;
            scope.spawn(move || {
                for _ in 0..50 {
                    for object in directory.get_all_objects_in_area(500, 500, 600) {
                        assert_eq!(object.y, 500);
                    }
                }
            });
        }
    });

    assert_eq!(directory.len(), 200);
    assert_eq!(index.len(), 200);

    let mut added = HashSet::new();
    let mut removed = HashSet::new();
    while let Ok(event) = events.recv_timeout(Duration::from_millis(50)) {
        match event {
            ObjectEvent::Added(object) => {
                added.insert(object.id);
            }
            ObjectEvent::Removed(id) => {
                removed.insert(id);
            }
            ObjectEvent::Updated(_) => unreachable!("no updates were issued"),
        }
    }
    assert_eq!(added.len(), 400);
    assert_eq!(removed.len(), 200);
}

#[test]
fn subscriber_thread_drains_until_cancelled() {
    let directory = common::directory_over(Arc::new(InMemoryGeoIndex::new()), 100, 100);
    let subscription = directory.subscribe();
    let token = subscription.token().clone();

    let consumer = thread::spawn(move || {
        let mut seen = Vec::new();
        let reason = subscription.for_each(|event| seen.push(event.object_id()));
        (seen, reason)
    });

    for id in 0..10 {
        directory.add(MapObject::new(ObjectId(id), 1, 1, 1, 1)).unwrap();
    }
    thread::sleep(Duration::from_millis(50));
    token.cancel();

    let (seen, reason) = consumer.join().unwrap();
    assert_eq!(reason, world_core::SubscriptionError::Cancelled);
    assert_eq!(seen, (0..10).map(ObjectId).collect::<Vec<_>>());
}

#[test]
fn grid_area_writes_are_atomic_to_readers() {
    let grid = SharedGrid::new(256, 256).unwrap();
    let tiles = [
        Tile::new(TileType::GRASS, TerritoryId(1)).unwrap(),
        Tile::new(TileType::SAND, TerritoryId(2)).unwrap(),
    ];
    grid.fill_area(0, 0, 256, 256, tiles[0]);

    thread::scope(|scope| {
        for writer in 0..2 {
            let grid = &grid;
            scope.spawn(move || {
                for i in 0..40 {
                    grid.fill_area(0, 0, 256, 256, tiles[(i + writer) % 2]);
                }
            });
        }
        for _ in 0..3 {
            let grid = &grid;
            scope.spawn(move || {
                for _ in 0..40 {
                    let territories = grid.territories_in_area(0, 0, 256, 256);
                    assert_eq!(territories.len(), 1);
                    assert!(grid.can_place_in_area(0, 0, 256, 256));
                }
            });
        }
    });
}
