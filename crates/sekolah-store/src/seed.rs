//! Default dataset
//!
//! Loaded into an empty store on first start and by `reset_to_defaults`.

use chrono::Utc;
use serde_json::json;

use sekolah_storage::Database;

use crate::collection::Collection;
use crate::record::Record;
use crate::{records, Result};

/// Setting key holding the time of the last reset
pub const SEEDED_AT_SETTING: &str = "seeded_at";

/// Present while a reset is in progress; removed once it completes
pub(crate) const SEED_PENDING_SETTING: &str = "seed_pending";

/// The fixed seed records per collection. Collections not listed start empty.
pub fn default_dataset() -> Vec<(Collection, Vec<Record>)> {
    vec![
        (Collection::Carousel, carousel()),
        (Collection::Works, works()),
        (Collection::Materi, materi()),
        (Collection::News, news()),
        (Collection::Perpustakaan, perpustakaan()),
        (Collection::Users, users()),
        (Collection::HomeContent, home_content()),
        (Collection::Settings, settings()),
    ]
}

/// Clear every collection, then insert the default dataset record by record.
pub(crate) fn reset(db: &Database) -> Result<()> {
    db.set_setting(SEED_PENDING_SETTING, &Utc::now().to_rfc3339())?;

    for collection in Collection::ALL {
        let removed = db.transaction(|conn| records::clear(conn, collection))?;
        tracing::debug!(collection = %collection, removed, "Cleared for reset");
    }

    let mut inserted = 0usize;
    for (collection, seed) in default_dataset() {
        for record in seed {
            db.transaction(|conn| records::create(conn, collection, record))?;
            inserted += 1;
        }
    }

    db.set_setting(SEEDED_AT_SETTING, &Utc::now().to_rfc3339())?;
    db.remove_setting(SEED_PENDING_SETTING)?;

    tracing::info!(records = inserted, "Store reset to default dataset");

    Ok(())
}

fn from_json(values: Vec<serde_json::Value>) -> Vec<Record> {
    values
        .into_iter()
        .filter_map(|v| Record::from_value(v).ok())
        .collect()
}

fn carousel() -> Vec<Record> {
    from_json(vec![
        json!({
            "id": "slide-1",
            "title": "Selamat Datang di Portal Sekolah",
            "description": "Informasi kegiatan, karya siswa dan perpustakaan dalam satu tempat",
            "image": "images/carousel/slide-1.jpg",
            "order": 1,
            "active": true
        }),
        json!({
            "id": "slide-2",
            "title": "Pameran Karya Siswa",
            "description": "Lukisan, kerajinan dan tulisan terbaik dari siswa kami",
            "image": "images/carousel/slide-2.jpg",
            "order": 2,
            "active": true
        }),
        json!({
            "id": "slide-3",
            "title": "Perpustakaan Digital",
            "description": "Pinjam dan baca koleksi buku sekolah kapan saja",
            "image": "images/carousel/slide-3.jpg",
            "order": 3,
            "active": true
        }),
        json!({
            "id": "slide-4",
            "title": "Penerimaan Siswa Baru",
            "description": "Pendaftaran tahun ajaran baru telah dibuka",
            "image": "images/carousel/slide-4.jpg",
            "order": 4,
            "active": true
        }),
    ])
}

fn works() -> Vec<Record> {
    from_json(vec![
        json!({
            "id": "work-1",
            "title": "Lukisan Pemandangan Desa",
            "author": "Siti Aminah",
            "kelas": "XI IPA 2",
            "category": "lukisan",
            "image": "images/works/work-1.jpg",
            "description": "Cat air di atas kertas, suasana pagi di desa",
            "likes": 0
        }),
        json!({
            "id": "work-2",
            "title": "Puisi: Ibu",
            "author": "Budi Santoso",
            "kelas": "X IPS 1",
            "category": "puisi",
            "image": "images/works/work-2.jpg",
            "description": "Juara 1 lomba cipta puisi tingkat kabupaten",
            "likes": 0
        }),
        json!({
            "id": "work-3",
            "title": "Miniatur Rumah Adat",
            "author": "Dewi Lestari",
            "kelas": "XII IPA 1",
            "category": "kerajinan",
            "image": "images/works/work-3.jpg",
            "description": "Miniatur rumah gadang dari stik es krim",
            "likes": 0
        }),
    ])
}

fn materi() -> Vec<Record> {
    from_json(vec![
        json!({
            "id": "materi-1",
            "title": "Pengantar Aljabar",
            "subject": "Matematika",
            "kelas": "X",
            "fileUrl": "materi/aljabar-dasar.pdf"
        }),
        json!({
            "id": "materi-2",
            "title": "Sistem Tata Surya",
            "subject": "IPA",
            "kelas": "X",
            "fileUrl": "materi/tata-surya.pdf"
        }),
    ])
}

fn news() -> Vec<Record> {
    from_json(vec![
        json!({
            "id": "news-1",
            "title": "Jadwal Ujian Akhir Semester",
            "content": "Ujian akhir semester dilaksanakan mulai tanggal 2 Desember.",
            "author": "Administrator",
            "category": "pengumuman"
        }),
        json!({
            "id": "news-2",
            "title": "Tim Basket Juara Provinsi",
            "content": "Tim basket putra meraih juara pertama kejuaraan antar SMA.",
            "author": "Guru Contoh",
            "category": "prestasi"
        }),
    ])
}

fn perpustakaan() -> Vec<Record> {
    from_json(vec![
        json!({
            "id": "book-1",
            "title": "Laskar Pelangi",
            "author": "Andrea Hirata",
            "category": "novel",
            "year": 2005,
            "available": true
        }),
        json!({
            "id": "book-2",
            "title": "Bumi Manusia",
            "author": "Pramoedya Ananta Toer",
            "category": "novel",
            "year": 1980,
            "available": true
        }),
        json!({
            "id": "book-3",
            "title": "Matematika untuk SMA Kelas X",
            "author": "Tim Penulis",
            "category": "pelajaran",
            "year": 2021,
            "available": true
        }),
    ])
}

fn users() -> Vec<Record> {
    from_json(vec![
        json!({
            "id": "admin",
            "username": "admin",
            "email": "admin@sekolah.id",
            "password": "admin123",
            "role": "admin",
            "name": "Administrator"
        }),
        json!({
            "id": "guru",
            "username": "guru",
            "email": "guru@sekolah.id",
            "password": "guru123",
            "role": "guru",
            "name": "Guru Contoh"
        }),
        json!({
            "id": "ortu",
            "username": "ortu",
            "email": "ortu@sekolah.id",
            "password": "ortu123",
            "role": "ortu",
            "name": "Orang Tua Contoh"
        }),
    ])
}

fn home_content() -> Vec<Record> {
    from_json(vec![json!({
        "id": "welcome",
        "title": "Selamat Datang",
        "content": "Portal resmi sekolah untuk siswa, guru dan orang tua."
    })])
}

fn settings() -> Vec<Record> {
    from_json(vec![json!({
        "id": "site",
        "schoolName": "Sekolah Portal",
        "address": "Jl. Pendidikan No. 1",
        "phone": "(021) 555-0100",
        "email": "info@sekolah.id"
    })])
}
