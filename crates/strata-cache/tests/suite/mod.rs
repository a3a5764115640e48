mod disk_cache;
