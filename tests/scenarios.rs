//! End-to-end scenarios against the public `Manager` facade (§8).

use disk_manager::config::ManagerConfig;
use disk_manager::model::{BlobNodeHeartbeat, DiskStatus, DiskType, HeartbeatExtra, NodeRole};
use disk_manager::persistence::InMemoryPersistence;
use disk_manager::scope::SequentialScopeAllocator;
use disk_manager::{Manager, ManagerError};
use std::sync::Arc;
use std::time::Duration;

fn new_manager(config: ManagerConfig) -> Arc<Manager> {
    Manager::new(config, Arc::new(InMemoryPersistence::default()), Arc::new(SequentialScopeAllocator::default()))
}

#[tokio::test]
async fn scenario_1_add_and_drop_a_disk() {
    let mgr = new_manager(ManagerConfig::default());

    let node_id = mgr.add_node("h1", "z0", "r1", DiskType::Hdd, NodeRole::Storage).await.unwrap();
    let disk_id = mgr.add_disk(node_id, "h1", "/d1", "z0", "r1").await.unwrap();

    mgr.switch_readonly(disk_id, true).await.unwrap();
    mgr.dropping_disk(disk_id).await.unwrap();
    mgr.dropped_disk(disk_id).await.unwrap();

    let disk = mgr.get_disk(disk_id).await.unwrap();
    assert_eq!(disk.status, DiskStatus::Dropped);
    assert!(!disk.dropping);
}

#[tokio::test]
async fn scenario_2_reject_backward_status() {
    let mgr = new_manager(ManagerConfig::default());
    let node_id = mgr.add_node("h1", "z0", "r1", DiskType::Hdd, NodeRole::Storage).await.unwrap();
    let disk_id = mgr.add_disk(node_id, "h1", "/d1", "z0", "r1").await.unwrap();

    mgr.set_status(disk_id, DiskStatus::Broken).await.unwrap();
    mgr.set_status(disk_id, DiskStatus::Repairing).await.unwrap();

    let err = mgr.set_status(disk_id, DiskStatus::Normal).await.unwrap_err();
    assert!(matches!(err, ManagerError::ChangeDiskStatusNotAllow { .. }));
}

#[tokio::test]
async fn scenario_3_reject_non_adjacent_forward_but_allow_dropped_jump() {
    let mgr = new_manager(ManagerConfig::default());
    let node_id = mgr.add_node("h1", "z0", "r1", DiskType::Hdd, NodeRole::Storage).await.unwrap();
    let disk_id = mgr.add_disk(node_id, "h1", "/d1", "z0", "r1").await.unwrap();

    let err = mgr.set_status(disk_id, DiskStatus::Repairing).await.unwrap_err();
    assert!(matches!(err, ManagerError::ChangeDiskStatusNotAllow { .. }));

    mgr.set_status(disk_id, DiskStatus::Dropped).await.unwrap();
    let disk = mgr.get_disk(disk_id).await.unwrap();
    assert_eq!(disk.status, DiskStatus::Dropped);
}

#[tokio::test]
async fn scenario_4_duplicate_host_path() {
    let mgr = new_manager(ManagerConfig::default());
    let node_id = mgr.add_node("h1", "z0", "r1", DiskType::Hdd, NodeRole::Storage).await.unwrap();
    mgr.add_disk(node_id, "h1", "/d1", "z0", "r1").await.unwrap();

    let err = mgr.add_disk(node_id, "h1", "/d1", "z0", "r1").await.unwrap_err();
    assert!(matches!(err, ManagerError::IllegalArgumentDiskPath { .. }));
}

#[tokio::test]
async fn scenario_5_heartbeat_edge() {
    let mut config = ManagerConfig::default();
    config.heartbeat_expire_interval = Duration::from_millis(20);
    let mgr = new_manager(config);

    let node_id = mgr.add_node("h1", "z0", "r1", DiskType::Hdd, NodeRole::Storage).await.unwrap();
    let disk_id = mgr.add_disk(node_id, "h1", "/d1", "z0", "r1").await.unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;

    let events = mgr.get_heartbeat_change_disks().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].disk_id, disk_id);
    assert!(!events[0].alive);

    assert!(mgr.get_heartbeat_change_disks().await.is_empty());

    let extra = HeartbeatExtra::BlobNode(BlobNodeHeartbeat {
        free: 100,
        size: 200,
        free_chunk_cnt: 5,
        oversold_free_chunk_cnt: 0,
        max_chunk_cnt: 10,
    });
    mgr.heartbeat(disk_id, extra).await.unwrap();

    let events = mgr.get_heartbeat_change_disks().await;
    assert_eq!(events, vec![disk_manager::heartbeat::HeartbeatEvent { disk_id, alive: true }]);
}

#[tokio::test]
async fn scenario_6_writable_space_host_aware() {
    let mut config = ManagerConfig::default();
    config.code_modes = vec![disk_manager::config::CodeMode { n: 9, m: 3, l: 0 }];
    config.item_size = 1;
    let mgr = new_manager(config);

    let item_size = 1u64;
    let free_chunks = 10u32;
    for idc_idx in 0..3 {
        let idc = format!("z{}", idc_idx);
        for host_idx in 0..4 {
            let host = format!("h{}-{}", idc_idx, host_idx);
            let node_id = mgr.add_node(&host, &idc, &host, DiskType::Hdd, NodeRole::Storage).await.unwrap();
            let disk_id = mgr.add_disk(node_id, &host, "/d0", &idc, &host).await.unwrap();
            let extra = HeartbeatExtra::BlobNode(BlobNodeHeartbeat {
                free: free_chunks as u64 * item_size,
                size: free_chunks as u64 * item_size,
                free_chunk_cnt: free_chunks,
                oversold_free_chunk_cnt: 0,
                max_chunk_cnt: free_chunks,
            });
            mgr.heartbeat(disk_id, extra).await.unwrap();
        }
    }

    mgr.rebuild_allocator().await;

    let writable = mgr.writable_space(DiskType::Hdd);
    assert_eq!(writable, 10 * 9 * item_size);
}
