use std::sync::Arc;
use std::time::Duration;

use peerbeam_transfer::{
    CHUNK_SIZE, DirectChannel, DiskSink, FileMeta, Frame, MemorySink, Payload, PayloadSink, ProgressReport,
    ReceivedFile, ReceiverConfig, ReceiverEvent, SenderConfig, TracingLogger, TransferError, decode_chunk,
    run_receiver, run_sender,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

const MIB: usize = CHUNK_SIZE;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("peerbeam_transfer=debug")
        .with_test_writer()
        .try_init();
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn meta(name: &str, len: usize) -> FileMeta {
    FileMeta {
        name: name.into(),
        size: len as u64,
        mime_type: "application/octet-stream".into(),
    }
}

/// Send `data` through an in-memory channel and return what the receiver
/// delivered, plus the final progress seen on each side.
async fn transfer<S: PayloadSink + 'static>(
    data: Vec<u8>,
    window: usize,
    sink: S,
) -> (Vec<ReceivedFile>, ProgressReport, ProgressReport) {
    init_tracing();
    let (near, far) = DirectChannel::pair(window);
    let (outbound, _near_inbound) = near.into_split();
    let (_far_outbound, mut inbound) = far.into_split();

    let (send_progress, send_progress_rx) = watch::channel(ProgressReport::default());
    let (recv_progress, recv_progress_rx) = watch::channel(ProgressReport::default());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let receiver_cancel = cancel.clone();
    let receiver = tokio::spawn(async move {
        let config = ReceiverConfig::default().with_logger(Arc::new(TracingLogger));
        run_receiver(config, &mut inbound, sink, &events_tx, &recv_progress, &receiver_cancel).await
    });

    let config = SenderConfig::new(meta("payload.bin", data.len())).with_logger(Arc::new(TracingLogger));
    let sent = run_sender(config, &data[..], &outbound, &send_progress, &cancel)
        .await
        .unwrap();
    assert_eq!(sent, data.len() as u64);
    drop(outbound);

    let delivered = receiver.await.unwrap().unwrap();

    let mut files = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        if let ReceiverEvent::Delivered(file) = event {
            files.push(file);
        }
    }
    assert_eq!(files.len(), delivered);

    let sender_final = *send_progress_rx.borrow();
    let receiver_final = *recv_progress_rx.borrow();
    (files, sender_final, receiver_final)
}

#[tokio::test]
async fn three_mib_file_is_three_chunks() {
    let data = pattern(3 * MIB);
    let (tx, mut rx) = mpsc::channel(16);
    let (progress, progress_rx) = watch::channel(ProgressReport::default());
    let cancel = CancellationToken::new();

    run_sender(SenderConfig::new(meta("three.bin", data.len())), &data[..], &tx, &progress, &cancel)
        .await
        .unwrap();
    drop(tx);

    let mut binary = Vec::new();
    while let Some(frame) = rx.recv().await {
        if let Frame::Binary(bytes) = frame {
            binary.push(decode_chunk(&bytes).unwrap());
        }
    }
    assert_eq!(binary.len(), 3);
    for (i, (index, payload)) in binary.iter().enumerate() {
        assert_eq!(*index as usize, i);
        assert_eq!(payload.len(), MIB);
    }
    assert_eq!(progress_rx.borrow().percent, 100.0);
}

#[tokio::test]
async fn reassembly_is_byte_for_byte() {
    let data = pattern(3 * MIB);
    let (files, sent, received) = transfer(data.clone(), 2, MemorySink::new()).await;

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].meta.size, data.len() as u64);
    assert_eq!(files[0].bytes().map(|b| b.to_vec()), Some(data));
    assert_eq!(sent.percent, 100.0);
    assert_eq!(received.percent, 100.0);
}

#[tokio::test]
async fn non_multiple_sizes_keep_their_remainder() {
    for len in [1, MIB - 1, MIB + 1, 2 * MIB + 12_345] {
        let data = pattern(len);
        let (files, _, received) = transfer(data.clone(), 1, MemorySink::new()).await;
        assert_eq!(files.len(), 1, "len {len}");
        assert_eq!(files[0].bytes().map(|b| b.len()), Some(len));
        assert_eq!(files[0].bytes().map(|b| b.to_vec()), Some(data));
        assert_eq!(received.bytes_moved, len as u64);
    }
}

#[tokio::test]
async fn empty_file_is_delivered() {
    let (files, sent, received) = transfer(Vec::new(), 4, MemorySink::new()).await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].payload, Payload::Memory(bytes::Bytes::new()));
    assert_eq!(sent.percent, 100.0);
    assert_eq!(received.percent, 100.0);
}

#[tokio::test]
async fn progress_never_goes_backwards() {
    let data = pattern(5 * MIB);
    let (near, far) = DirectChannel::pair(1);
    let (outbound, _near_inbound) = near.into_split();
    let (_far_outbound, mut inbound) = far.into_split();
    let (progress, _) = watch::channel(ProgressReport::default());
    let (recv_progress, mut recv_progress_rx) = watch::channel(ProgressReport::default());
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let receiver_cancel = cancel.clone();
    let receiver = tokio::spawn(async move {
        run_receiver(
            ReceiverConfig::default(),
            &mut inbound,
            MemorySink::new(),
            &events_tx,
            &recv_progress,
            &receiver_cancel,
        )
        .await
    });

    let watcher = tokio::spawn(async move {
        let mut seen = vec![recv_progress_rx.borrow().percent];
        while recv_progress_rx.changed().await.is_ok() {
            seen.push(recv_progress_rx.borrow_and_update().percent);
        }
        seen
    });

    run_sender(SenderConfig::new(meta("five.bin", data.len())), &data[..], &outbound, &progress, &cancel)
        .await
        .unwrap();
    drop(outbound);
    assert_eq!(receiver.await.unwrap().unwrap(), 1);

    let seen = watcher.await.unwrap();
    // The reset to 0 on file-info is the start of this transfer, not a regression
    let from_start = seen.iter().rposition(|p| *p == 0.0).unwrap_or(0);
    for pair in seen[from_start..].windows(2) {
        assert!(pair[1] >= pair[0], "progress went {} -> {}", pair[0], pair[1]);
    }
    assert_eq!(seen.last().copied(), Some(100.0));
}

#[tokio::test]
async fn channel_loss_discards_partial_data() {
    let (near, far) = DirectChannel::pair(4);
    let (outbound, _near_inbound) = near.into_split();
    let (_far_outbound, mut inbound) = far.into_split();
    let (recv_progress, _) = watch::channel(ProgressReport::default());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    // Announce 2 MiB, deliver half, then the channel goes away
    let info = peerbeam_transfer::ControlFrame::from(&meta("cut.bin", 2 * MIB)).to_json().unwrap();
    outbound.send(Frame::Text(info)).await.unwrap();
    outbound
        .send(Frame::Binary(peerbeam_transfer::encode_chunk(0, &pattern(MIB))))
        .await
        .unwrap();
    drop(outbound);

    let result = run_receiver(
        ReceiverConfig::default(),
        &mut inbound,
        MemorySink::new(),
        &events_tx,
        &recv_progress,
        &cancel,
    )
    .await;
    assert!(matches!(result, Err(TransferError::ChannelLost)));
    drop(events_tx);

    while let Some(event) = events_rx.recv().await {
        assert!(!matches!(event, ReceiverEvent::Delivered(_)));
    }
}

#[tokio::test]
async fn window_bounds_how_far_the_sender_runs_ahead() {
    let data = pattern(6 * MIB);
    let window = 2;
    let (near, far) = DirectChannel::pair(window);
    let (outbound, _near_inbound) = near.into_split();
    let (_far_outbound, mut inbound) = far.into_split();
    let (progress, progress_rx) = watch::channel(ProgressReport::default());
    let cancel = CancellationToken::new();

    let sender = tokio::spawn(async move {
        run_sender(SenderConfig::new(meta("slow.bin", data.len())), &data[..], &outbound, &progress, &cancel).await
    });

    // Nobody reads: file-info plus `window` frames fit, the sender then waits
    tokio::time::sleep(Duration::from_millis(100)).await;
    let ahead = progress_rx.borrow().bytes_moved;
    assert!(ahead <= (window * MIB) as u64, "sender ran {ahead} bytes ahead");
    assert!(!sender.is_finished());

    let mut frames = 0;
    while let Some(_frame) = inbound.recv().await {
        frames += 1;
    }
    // file-info + 6 chunks + file-complete
    assert_eq!(frames, 8);
    assert_eq!(sender.await.unwrap().unwrap(), (6 * MIB) as u64);
}

#[tokio::test]
async fn disk_sink_writes_final_file() {
    let dir = std::env::temp_dir().join(format!("peerbeam_loopback_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let data = pattern(MIB + 77);
    let (files, _, _) = transfer(data.clone(), 2, DiskSink::new(&dir)).await;

    assert_eq!(files.len(), 1);
    match &files[0].payload {
        Payload::Disk(path) => {
            assert_eq!(path, &dir.join("payload.bin"));
            assert_eq!(std::fs::read(path).unwrap(), data);
        }
        other => panic!("expected a file on disk, got {other:?}"),
    }
    assert!(!dir.join("payload.bin.part").exists());

    let _ = std::fs::remove_dir_all(&dir);
}
